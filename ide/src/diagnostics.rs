//! Project diagnostics from `flow status`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use flowide_types::{
    Diagnostic, DiagnosticSeverity, DiagnosticsReport, MessagePart, Position, Range, StatusError,
    StatusResponse,
};
use serde::Serialize;

use crate::FlowIde;
use crate::text::basename;

/// Extensions the checker reports on.
pub const CHECKED_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "es6"];

pub const DIAGNOSTIC_SOURCE: &str = "flow";

/// Result of a status refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiagnosticsUpdate {
    /// Replace all published diagnostics with these.
    Report(DiagnosticsReport),
    /// The status check itself failed; show this in the status indicator.
    CheckFailed { message: String },
}

#[must_use]
pub fn is_checked_file(path: &Path) -> bool {
    path.is_absolute()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| CHECKED_EXTENSIONS.contains(&ext))
}

fn render_part(part: &MessagePart) -> String {
    if part.is_blame() {
        format!(
            "{} ({}:{}:{})",
            part.descr,
            basename(&part.path),
            part.line,
            part.start
        )
    } else {
        part.descr.clone()
    }
}

fn render_message(error: &StatusError) -> String {
    error
        .message
        .iter()
        .map(render_part)
        .collect::<Vec<_>>()
        .join(" ")
}

fn blame_range(blame: &MessagePart) -> Range {
    Range::new(
        Position::saturating_from_checker(blame.line, blame.start),
        Position::new(blame.endline.saturating_sub(1), blame.end),
    )
}

/// Convert one status error. Errors that blame no location are dropped.
fn to_diagnostic(error: &StatusError) -> Option<(PathBuf, Diagnostic)> {
    let (anchor, message) = match error.blamed_operation() {
        Some(operation) => (
            operation,
            format!("{} error: {}", render_part(operation), render_message(error)),
        ),
        None => (error.first_blame()?, render_message(error)),
    };
    Some((
        PathBuf::from(&anchor.path),
        Diagnostic {
            range: blame_range(anchor),
            message,
            severity: DiagnosticSeverity::from_level(&error.level),
            source: DIAGNOSTIC_SOURCE.to_string(),
        },
    ))
}

/// Group status errors by the file they blame. Files with errors sort first,
/// then by path.
pub(crate) fn group_by_file(status: &StatusResponse) -> DiagnosticsReport {
    let mut grouped: HashMap<PathBuf, Vec<Diagnostic>> = HashMap::new();
    for error in &status.errors {
        match to_diagnostic(error) {
            Some((path, diagnostic)) => grouped.entry(path).or_default().push(diagnostic),
            None => tracing::debug!("Skipping status error without a location"),
        }
    }

    let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = grouped.into_iter().collect();
    files.sort_by(|a, b| {
        let a_has_errors = a.1.iter().any(|d| d.severity.is_error());
        let b_has_errors = b.1.iter().any(|d| d.severity.is_error());
        b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
    });
    DiagnosticsReport::new(files)
}

impl FlowIde {
    /// Re-run the project status check for `path` and return what to publish.
    ///
    /// `None` means there is nothing to update: the file is not something the
    /// checker handles, or no checker ran.
    pub async fn diagnostics(&self, path: &Path) -> Option<DiagnosticsUpdate> {
        if !is_checked_file(path) {
            return None;
        }
        match self.client().status_check(path).await {
            Ok(Some(status)) => Some(DiagnosticsUpdate::Report(group_by_file(&status))),
            Ok(None) => None,
            Err(e) if e.is_canceled() => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Flow status check failed: {e}");
                Some(DiagnosticsUpdate::CheckFailed {
                    message: e.to_string(),
                })
            }
        }
    }
}
