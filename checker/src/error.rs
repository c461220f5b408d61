//! Failure taxonomy for checker requests.
//!
//! "Nothing to do" outcomes (missing file, missing binary) are not errors; they
//! are reported as [`crate::CheckerOutput::Skipped`].

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

/// How the checker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl ExitReason {
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitReason::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitReason::Signal(signal);
            }
        }
        ExitReason::Unknown
    }

    #[must_use]
    pub fn code(self) -> Option<i32> {
        match self {
            ExitReason::Code(code) => Some(code),
            ExitReason::Signal(_) | ExitReason::Unknown => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Code(code) => write!(f, "code {code}"),
            ExitReason::Signal(signal) => write!(f, "signal {signal}"),
            ExitReason::Unknown => f.write_str("unknown status"),
        }
    }
}

/// `Clone` so a de-duplicated status poll can hand the same failure to every
/// waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckerError {
    #[error("operation canceled")]
    Canceled,
    #[error("flow exited with {exit}: {stderr}")]
    ToolFailure { exit: ExitReason, stderr: String },
    #[error("failed to run {}: {message}", binary.display())]
    Spawn { binary: PathBuf, message: String },
    #[error("malformed checker output: {message}")]
    MalformedOutput { message: String },
    #[error("checker task failed: {message}")]
    TaskFailed { message: String },
}

impl CheckerError {
    /// Cancellation is an expected outcome and must not be reported as an
    /// application error.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, CheckerError::Canceled)
    }

    /// Exit status of the checker, when the failure came from the process itself.
    #[must_use]
    pub fn exit(&self) -> Option<ExitReason> {
        match self {
            CheckerError::ToolFailure { exit, .. } => Some(*exit),
            _ => None,
        }
    }
}
