//! Editor-neutral language features for Flow.
//!
//! Each provider turns one checker response into editor primitives from
//! `flowide-types`. Providers never fail: checker errors are logged and the
//! provider returns `None`, so one bad request cannot disrupt the editor.

mod completion;
mod coverage;
mod definition;
mod diagnostics;
mod hover;
mod signature;
mod text;

pub use diagnostics::{CHECKED_EXTENSIONS, DIAGNOSTIC_SOURCE, DiagnosticsUpdate, is_checked_file};
pub use hover::{HOVER_LANGUAGE, HOVER_TITLE};
pub use text::Document;

use flowide_checker::{CheckerError, FlowClient};

/// Presentation switches for the providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Insert `name({{arg}}){{}}` snippets for function completions.
    pub function_snippets: bool,
    /// Report uncovered ranges along with the coverage percentage.
    pub coverage_decorations: bool,
}

/// Entry point for all providers. Cheap to clone; clones share the checker
/// client and its per-project state.
#[derive(Clone)]
pub struct FlowIde {
    client: FlowClient,
    settings: ProviderSettings,
}

impl FlowIde {
    #[must_use]
    pub fn new(client: FlowClient, settings: ProviderSettings) -> Self {
        Self { client, settings }
    }

    #[must_use]
    pub fn client(&self) -> &FlowClient {
        &self.client
    }

    #[must_use]
    pub fn settings(&self) -> ProviderSettings {
        self.settings
    }
}

/// Provider boundary: failures become "no result". Cancellation is expected
/// and not logged.
pub(crate) fn settle<T>(operation: &str, result: Result<Option<T>, CheckerError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) if e.is_canceled() => None,
        Err(e) => {
            tracing::warn!(operation, "Flow request failed: {e}");
            None
        }
    }
}
