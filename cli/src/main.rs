//! flowide CLI - run one provider against a file and print the result as JSON.
//!
//! ```text
//! flowide complete src/app.js 12 7 --stdin < buffer.js
//! flowide status src/app.js
//! ```
//!
//! Lines and columns are 1-based. Output goes to stdout; logs go to
//! `logs/flowide.log` next to the config file so they never mix with it.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io::{self, Read},
    path::{self, Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

use flowide_checker::FlowClient;
use flowide_config::FlowideConfig;
use flowide_ide::{Document, FlowIde};
use flowide_types::Position;

#[derive(Debug, Parser)]
#[command(name = "flowide")]
#[command(about = "Query the Flow type checker the way an editor would")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Project diagnostics for the project containing FILE
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Completions at a position
    Complete {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        at: At,
    },
    /// Type of the identifier at a position
    Hover {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        at: At,
    },
    /// Definition of the symbol at a position
    Definition {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        at: At,
    },
    /// Type coverage of the file
    Coverage {
        #[command(flatten)]
        target: Target,
    },
    /// Parameters of the call surrounding a position
    Signature {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        at: At,
    },
}

#[derive(Debug, Args)]
struct Target {
    /// Source file
    file: PathBuf,
    /// Read the buffer from stdin instead of the file on disk
    #[arg(long)]
    stdin: bool,
}

#[derive(Debug, Args)]
struct At {
    /// 1-based line
    line: u32,
    /// 1-based column
    column: u32,
}

impl At {
    fn position(&self) -> Result<Position> {
        Ok(Position::from_one_based(self.line, self.column)?)
    }
}

impl Target {
    fn path(&self) -> Result<PathBuf> {
        path::absolute(&self.file)
            .with_context(|| format!("resolving {}", self.file.display()))
    }

    /// Buffer text. A file that does not exist reads as empty; the checker
    /// skips it anyway.
    fn contents(&self, path: &Path) -> Result<String> {
        if self.stdin {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading buffer from stdin")?;
            return Ok(text);
        }
        if !path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

/// Logs go to a file. Without one, warnings and errors still reach stderr;
/// stdout is reserved for the JSON result.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut problems = Vec::new();
    let Some((log_path, file)) = log_file_candidates()
        .into_iter()
        .find_map(|candidate| open_log_file(candidate, &mut problems))
    else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_filter(LevelFilter::WARN),
            )
            .init();
        for problem in problems {
            tracing::warn!("{problem}");
        }
        return;
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(filter)
        .init();
    tracing::debug!(path = %log_path.display(), "flowide log opened");
    for problem in problems {
        tracing::warn!("{problem}");
    }
}

fn open_log_file(path: PathBuf, problems: &mut Vec<String>) -> Option<(PathBuf, fs::File)> {
    if let Some(dir) = path.parent()
        && let Err(e) = fs::create_dir_all(dir)
    {
        problems.push(format!("Cannot create {}: {e}", dir.display()));
        return None;
    }
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some((path, file)),
        Err(e) => {
            problems.push(format!("Cannot open {}: {e}", path.display()));
            None
        }
    }
}

/// `logs/flowide.log` beside the config file, then under `./.flowide`.
fn log_file_candidates() -> Vec<PathBuf> {
    let beside_config = flowide_config::config_path()
        .and_then(|config| config.parent().map(|dir| dir.join("logs").join("flowide.log")));
    beside_config
        .into_iter()
        .chain([Path::new(".flowide").join("logs").join("flowide.log")])
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing result")?;
    println!("{json}");
    Ok(())
}

async fn run(command: Command, ide: &FlowIde) -> Result<()> {
    match command {
        Command::Status { target } => {
            if target.stdin {
                bail!("status checks the saved project; --stdin is not supported");
            }
            let path = target.path()?;
            print_json(&ide.diagnostics(&path).await)
        }
        Command::Complete { target, at } => {
            let path = target.path()?;
            let text = target.contents(&path)?;
            let doc = Document::new(&path, &text);
            print_json(&ide.completions(doc, at.position()?, None).await)
        }
        Command::Hover { target, at } => {
            let path = target.path()?;
            let text = target.contents(&path)?;
            let doc = Document::new(&path, &text);
            print_json(&ide.hover(doc, at.position()?, None).await)
        }
        Command::Definition { target, at } => {
            let path = target.path()?;
            let text = target.contents(&path)?;
            let doc = Document::new(&path, &text);
            print_json(&ide.definition(doc, at.position()?, None).await)
        }
        Command::Coverage { target } => {
            let path = target.path()?;
            let text = target.contents(&path)?;
            let doc = Document::new(&path, &text);
            print_json(&ide.coverage(doc, None).await)
        }
        Command::Signature { target, at } => {
            let path = target.path()?;
            let text = target.contents(&path)?;
            let doc = Document::new(&path, &text);
            print_json(&ide.signature_help(doc, at.position()?, None).await)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = FlowideConfig::load()
        .context("loading flowide config")?
        .unwrap_or_default();
    let ide = FlowIde::new(
        FlowClient::new(config.checker_options()),
        config.provider_settings(),
    );

    run(cli.command, &ide).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_position_commands() {
        let cli = Cli::try_parse_from(["flowide", "complete", "a.js", "3", "7", "--stdin"]).unwrap();
        let Command::Complete { target, at } = cli.command else {
            panic!("expected complete");
        };
        assert!(target.stdin);
        assert_eq!(target.file, PathBuf::from("a.js"));
        assert_eq!(at.position().unwrap(), Position::new(2, 6));
    }

    #[test]
    fn file_only_commands() {
        let cli = Cli::try_parse_from(["flowide", "coverage", "a.js"]).unwrap();
        assert!(matches!(cli.command, Command::Coverage { target } if !target.stdin));
    }

    #[test]
    fn position_is_required() {
        assert!(Cli::try_parse_from(["flowide", "hover", "a.js"]).is_err());
    }

    #[test]
    fn zero_line_is_rejected() {
        let at = At { line: 0, column: 1 };
        assert!(at.position().is_err());
    }

    #[test]
    fn log_file_sits_beside_config_first() {
        let candidates = log_file_candidates();
        assert!(candidates.last().unwrap().ends_with(".flowide/logs/flowide.log"));
        if let Some(config) = flowide_config::config_path() {
            assert_eq!(
                candidates[0],
                config.parent().unwrap().join("logs").join("flowide.log")
            );
        }
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, "").unwrap();

        let mut problems = Vec::new();
        assert!(open_log_file(blocker.join("flowide.log"), &mut problems).is_none());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("Cannot create"));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let target = Target {
            file: PathBuf::from("src/a.js"),
            stdin: false,
        };
        let path = target.path().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("src/a.js"));
    }
}
