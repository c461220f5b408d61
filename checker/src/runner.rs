//! Running a single checker invocation.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::{CheckerError, ExitReason};

/// Upper bound on captured stderr. Anything non-empty is a failure, so the
/// head is all that matters.
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// How long to keep draining output pipes after the process exited. A
/// daemonized grandchild can hold them open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an interrupted checker gets to exit before it is killed.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Why a request produced nothing without running the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FileMissing,
    BinaryMissing,
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckerOutput {
    /// The checker was not run.
    Skipped(SkipReason),
    /// The checker ran and printed nothing.
    Empty,
    Json(serde_json::Value),
}

/// One fully-resolved checker command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Written to stdin, which is then closed.
    pub stdin: Option<String>,
}

/// Quote an argument for display the way a POSIX shell would need it.
fn format_arg(arg: &str) -> String {
    let plain = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=' | '.' | '/'));
    if plain && !arg.is_empty() {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

impl Invocation {
    /// Human-readable command line for the log, e.g. `flow autocomplete --json /p/a.js 1 7`.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = String::from("flow");
        for arg in &self.args {
            line.push(' ');
            line.push_str(&format_arg(arg));
        }
        line
    }

    /// Spawn the checker and wait for it, honoring `cancel`.
    pub async fn run(&self, cancel: Option<&CancellationToken>) -> Result<CheckerOutput, CheckerError> {
        let command = self.command_line();
        tracing::debug!(%command, cwd = %self.cwd.display(), "Running");

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::warn!(%command, binary = %self.binary.display(), "Failed to spawn: {e}");
                CheckerError::Spawn {
                    binary: self.binary.clone(),
                    message: e.to_string(),
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = self.stdin.clone().unwrap_or_default();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    // The checker may exit before reading its input.
                    tracing::debug!("Writing checker stdin failed: {e}");
                }
                // Dropping closes the pipe; the checker reads until EOF.
            });
        }

        let stdout = child.stdout.take().map(|out| tokio::spawn(read_text(out, None)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_text(err, Some(MAX_STDERR_BYTES))));

        let waited = wait_for_exit(&mut child, cancel).await.map_err(|e| {
            CheckerError::Spawn {
                binary: self.binary.clone(),
                message: e.to_string(),
            }
        })?;
        let status = match waited {
            Waited::Exited(status) => status,
            Waited::Interrupted(status) if !exited_from_interrupt(status) => status,
            Waited::Interrupted(_) | Waited::Killed => {
                tracing::info!(%command, "Operation was canceled");
                for reader in [&stdout, &stderr].into_iter().flatten() {
                    reader.abort();
                }
                return Err(CheckerError::Canceled);
            }
        };
        let exit = ExitReason::from_status(status);

        let stdout = drain(stdout).await;
        let stderr = drain(stderr).await;

        if !stderr.is_empty() {
            tracing::warn!(%command, %exit, "Checker failed: {stderr}");
            return Err(CheckerError::ToolFailure { exit, stderr });
        }

        tracing::debug!(%command, "Result: {stdout}");
        if stdout.is_empty() {
            return Ok(CheckerOutput::Empty);
        }
        serde_json::from_str(&stdout)
            .map(CheckerOutput::Json)
            .map_err(|e| {
                tracing::warn!(%command, "Checker printed invalid JSON: {e}");
                CheckerError::MalformedOutput {
                    message: e.to_string(),
                }
            })
    }
}

async fn read_text<R>(reader: R, limit: Option<u64>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let result = match limit {
        Some(limit) => reader.take(limit).read_to_end(&mut buf).await,
        None => {
            let mut reader = reader;
            reader.read_to_end(&mut buf).await
        }
    };
    if let Err(e) = result {
        tracing::debug!("Reading checker output failed: {e}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn drain(task: Option<tokio::task::JoinHandle<String>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    let abort = task.abort_handle();
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!("Checker output reader failed: {e}");
            String::new()
        }
        Err(_) => {
            tracing::warn!("Checker output still open after exit; giving up on it");
            abort.abort();
            String::new()
        }
    }
}

enum Waited {
    Exited(ExitStatus),
    /// Exited after being interrupted.
    Interrupted(ExitStatus),
    /// Ignored the interrupt for [`INTERRUPT_GRACE`] and was killed.
    Killed,
}

/// Wait for the child to exit. If `cancel` fires first the child is
/// interrupted, then killed if it is still running after the grace period.
async fn wait_for_exit(
    child: &mut Child,
    cancel: Option<&CancellationToken>,
) -> std::io::Result<Waited> {
    let Some(cancel) = cancel else {
        return Ok(Waited::Exited(child.wait().await?));
    };

    tokio::select! {
        status = child.wait() => return Ok(Waited::Exited(status?)),
        () = cancel.cancelled() => {}
    }

    interrupt(child);
    if let Ok(status) = tokio::time::timeout(INTERRUPT_GRACE, child.wait()).await {
        return Ok(Waited::Interrupted(status?));
    }

    tracing::warn!("Checker ignored the interrupt; killing it");
    child.start_kill()?;
    child.wait().await?;
    Ok(Waited::Killed)
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        let _ = child.start_kill();
        return;
    };
    // SAFETY: plain signal delivery to a pid we spawned and have not reaped.
    if unsafe { libc::kill(pid, libc::SIGINT) } == -1 {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exited_from_interrupt(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(libc::SIGINT)
}

#[cfg(not(unix))]
fn exited_from_interrupt(status: ExitStatus) -> bool {
    !status.success()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_arg_quotes_only_when_needed() {
        assert_eq!(format_arg("--json"), "--json");
        assert_eq!(format_arg("/p/src/a.js"), "/p/src/a.js");
        assert_eq!(format_arg("my file.js"), "'my file.js'");
        assert_eq!(format_arg("it's"), "'it'\\''s'");
        assert_eq!(format_arg(""), "''");
    }

    #[test]
    fn command_line_joins_args() {
        let invocation = Invocation {
            binary: PathBuf::from("/p/node_modules/.bin/flow"),
            args: ["autocomplete", "--json", "/p/a b.js", "1", "7"]
                .map(String::from)
                .to_vec(),
            cwd: PathBuf::from("/p"),
            stdin: None,
        };
        assert_eq!(
            invocation.command_line(),
            "flow autocomplete --json '/p/a b.js' 1 7"
        );
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("flow");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn invocation(binary: PathBuf, cwd: &Path, stdin: Option<&str>) -> Invocation {
            Invocation {
                binary,
                args: vec!["status".to_string(), "--json".to_string()],
                cwd: cwd.to_path_buf(),
                stdin: stdin.map(String::from),
            }
        }

        #[tokio::test]
        async fn parses_json_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), r#"echo '{"passed":true,"errors":[]}'"#);
            let out = invocation(bin, dir.path(), None).run(None).await.unwrap();
            assert_eq!(
                out,
                CheckerOutput::Json(serde_json::json!({ "passed": true, "errors": [] }))
            );
        }

        #[tokio::test]
        async fn pipes_stdin_and_closes_it() {
            let dir = tempfile::tempdir().unwrap();
            // `cat` only exits once stdin is closed.
            let bin = script(dir.path(), r#"printf '{"echo":"%s"}' "$(cat)""#);
            let out = invocation(bin, dir.path(), Some("foo.ba"))
                .run(None)
                .await
                .unwrap();
            assert_eq!(out, CheckerOutput::Json(serde_json::json!({ "echo": "foo.ba" })));
        }

        #[tokio::test]
        async fn empty_stdout_is_empty() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "exit 0");
            let out = invocation(bin, dir.path(), None).run(None).await.unwrap();
            assert_eq!(out, CheckerOutput::Empty);
        }

        #[tokio::test]
        async fn stderr_is_a_tool_failure_with_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "echo 'no server' >&2\nexit 2");
            let err = invocation(bin, dir.path(), None).run(None).await.unwrap_err();
            match err {
                CheckerError::ToolFailure { exit, stderr } => {
                    assert_eq!(exit, ExitReason::Code(2));
                    assert!(stderr.contains("no server"));
                }
                other => panic!("expected ToolFailure, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn stderr_fails_even_on_success_exit() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "echo '{}'\necho warn >&2\nexit 0");
            let err = invocation(bin, dir.path(), None).run(None).await.unwrap_err();
            assert_eq!(err.exit(), Some(ExitReason::Code(0)));
        }

        #[tokio::test]
        async fn invalid_json_is_malformed_output() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "echo 'Please wait...'");
            let err = invocation(bin, dir.path(), None).run(None).await.unwrap_err();
            assert!(matches!(err, CheckerError::MalformedOutput { .. }));
        }

        #[tokio::test]
        async fn missing_binary_is_a_spawn_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = invocation(dir.path().join("nope"), dir.path(), None)
                .run(None)
                .await
                .unwrap_err();
            assert!(matches!(err, CheckerError::Spawn { .. }));
        }

        #[tokio::test]
        async fn cancellation_interrupts_running_process() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "exec sleep 30");
            let token = CancellationToken::new();

            let canceler = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                canceler.cancel();
            });

            let started = std::time::Instant::now();
            let err = invocation(bin, dir.path(), None)
                .run(Some(&token))
                .await
                .unwrap_err();
            assert_eq!(err, CheckerError::Canceled);
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn checker_ignoring_interrupt_is_killed() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "trap '' INT\nwhile :; do sleep 1; done");
            let token = CancellationToken::new();

            let canceler = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                canceler.cancel();
            });

            let started = std::time::Instant::now();
            let err = invocation(bin, dir.path(), None)
                .run(Some(&token))
                .await
                .unwrap_err();
            assert_eq!(err, CheckerError::Canceled);
            assert!(started.elapsed() < INTERRUPT_GRACE + Duration::from_secs(3));
        }

        #[tokio::test]
        async fn runs_in_requested_directory() {
            let dir = tempfile::tempdir().unwrap();
            let work = dir.path().join("work");
            fs::create_dir_all(&work).unwrap();
            let bin = script(dir.path(), r#"printf '{"cwd":"%s"}' "$(basename "$PWD")""#);
            let out = invocation(bin, &work, None).run(None).await.unwrap();
            assert_eq!(out, CheckerOutput::Json(serde_json::json!({ "cwd": "work" })));
        }
    }
}
