//! Typed request facade over the checker CLI.
//!
//! Each operation maps its parameters onto a checker command line, admits it
//! into the project's queue, and decodes the JSON reply. All shared state (the
//! binary cache, queue tails, in-flight status polls) belongs to one client
//! instance; clones share it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowide_types::{
    AutocompleteResponse, CoverageResponse, DefinitionResponse, Position, StatusResponse,
    TypeAtPosResponse,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::CheckerError;
use crate::locator::{BinaryDiscovery, BinaryLocator, NodeModulesDiscovery};
use crate::queue::{ProjectQueue, StatusGate};
use crate::root::project_root_for_file;
use crate::runner::{CheckerOutput, Invocation, SkipReason};
use crate::watch::{FileWatcher, NotifyWatcher};

/// Options for the checker core. Loading them from disk is the host's job.
#[derive(Debug, Clone)]
pub struct CheckerOptions {
    /// When false every request is skipped without running anything.
    pub enabled: bool,
    /// Explicit binary; bypasses discovery while it exists.
    pub binary_override: Option<PathBuf>,
    /// Fall back to the binary on `PATH` when no package ships one.
    pub search_path: bool,
    /// Dependency that ships the binary.
    pub package: String,
    pub binary: String,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            binary_override: None,
            search_path: false,
            package: "flow-bin".to_string(),
            binary: "flow".to_string(),
        }
    }
}

struct Request {
    file: PathBuf,
    contents: Option<String>,
    args: Vec<String>,
    cancel: Option<CancellationToken>,
}

struct Inner {
    options: CheckerOptions,
    locator: BinaryLocator,
    queue: ProjectQueue,
    status: StatusGate,
}

impl Inner {
    fn binary_for(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(binary) = &self.options.binary_override {
            if binary.is_file() {
                return Some(binary.clone());
            }
            tracing::warn!(
                binary = %binary.display(),
                "Configured flow binary does not exist; falling back to discovery"
            );
        }
        self.locator.resolve(dir)
    }

    async fn execute(&self, request: Request) -> Result<CheckerOutput, CheckerError> {
        if request
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(CheckerError::Canceled);
        }
        if !self.options.enabled {
            return Ok(CheckerOutput::Skipped(SkipReason::Disabled));
        }
        if !request.file.exists() {
            tracing::debug!(file = %request.file.display(), "Skipping checker: file does not exist");
            return Ok(CheckerOutput::Skipped(SkipReason::FileMissing));
        }

        let cwd = request
            .file
            .parent()
            .map_or_else(|| request.file.clone(), Path::to_path_buf);
        let Some(binary) = self.binary_for(&cwd) else {
            return Ok(CheckerOutput::Skipped(SkipReason::BinaryMissing));
        };

        let invocation = Invocation {
            binary,
            args: request.args,
            cwd,
            stdin: request.contents,
        };
        invocation.run(request.cancel.as_ref()).await
    }
}

fn decode<T: DeserializeOwned>(output: CheckerOutput) -> Result<Option<T>, CheckerError> {
    match output {
        CheckerOutput::Skipped(_) | CheckerOutput::Empty => Ok(None),
        CheckerOutput::Json(value) => serde_json::from_value(value).map(Some).map_err(|e| {
            tracing::warn!("Unexpected checker output shape: {e}");
            CheckerError::MalformedOutput {
                message: e.to_string(),
            }
        }),
    }
}

fn file_arg(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

fn position_args(position: Position) -> [String; 2] {
    [
        position.one_based_line().to_string(),
        position.one_based_column().to_string(),
    ]
}

/// Typed access to the checker.
///
/// Operations admit their request before returning, so the queue order is
/// the call order even if the returned futures are polled later. Dropping a
/// returned future does not stop the checker; pass a cancellation token.
#[derive(Clone)]
pub struct FlowClient {
    inner: Arc<Inner>,
}

impl FlowClient {
    /// Client with node-modules discovery and real filesystem watches.
    #[must_use]
    pub fn new(options: CheckerOptions) -> Self {
        let discovery = NodeModulesDiscovery::new(options.package.clone(), options.binary.clone())
            .with_search_path(options.search_path);
        Self::with_parts(options, Arc::new(discovery), Arc::new(NotifyWatcher))
    }

    #[must_use]
    pub fn with_parts(
        options: CheckerOptions,
        discovery: Arc<dyn BinaryDiscovery>,
        watcher: Arc<dyn FileWatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                locator: BinaryLocator::new(discovery, watcher),
                queue: ProjectQueue::new(),
                status: StatusGate::new(),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &CheckerOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn locator(&self) -> &BinaryLocator {
        &self.inner.locator
    }

    fn exec(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<CheckerOutput, CheckerError>> + Send + 'static + use<> {
        let root = project_root_for_file(&request.file);
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .admit(&root, move || async move { inner.execute(request).await })
    }

    /// `type-at-pos --json --pretty --path <file> <line> <col>`
    pub fn type_at_position(
        &self,
        file: &Path,
        contents: &str,
        position: Position,
        cancel: Option<CancellationToken>,
    ) -> impl Future<Output = Result<Option<TypeAtPosResponse>, CheckerError>> + Send + 'static + use<> {
        let [line, column] = position_args(position);
        let pending = self.exec(Request {
            file: file.to_path_buf(),
            contents: Some(contents.to_string()),
            args: vec![
                "type-at-pos".to_string(),
                "--json".to_string(),
                "--pretty".to_string(),
                "--path".to_string(),
                file_arg(file),
                line,
                column,
            ],
            cancel,
        });
        async move { decode(pending.await?) }
    }

    /// `status --json` for the whole project `file` belongs to.
    ///
    /// Runs outside the interactive queue. Concurrent calls for one project
    /// share a single checker run.
    pub fn status_check(
        &self,
        file: &Path,
    ) -> impl Future<Output = Result<Option<StatusResponse>, CheckerError>> + Send + 'static + use<> {
        let root = project_root_for_file(file);
        let inner = Arc::clone(&self.inner);
        let request = Request {
            file: file.to_path_buf(),
            contents: None,
            args: vec!["status".to_string(), "--json".to_string()],
            cancel: None,
        };
        let shared = self
            .inner
            .status
            .poll(&root, move || async move { inner.execute(request).await });
        async move { decode(shared.await?) }
    }

    /// `autocomplete --json <file> <line> <col>`
    pub fn autocomplete(
        &self,
        file: &Path,
        contents: &str,
        position: Position,
        cancel: Option<CancellationToken>,
    ) -> impl Future<Output = Result<Option<AutocompleteResponse>, CheckerError>> + Send + 'static + use<>
    {
        let [line, column] = position_args(position);
        let pending = self.exec(Request {
            file: file.to_path_buf(),
            contents: Some(contents.to_string()),
            args: vec![
                "autocomplete".to_string(),
                "--json".to_string(),
                file_arg(file),
                line,
                column,
            ],
            cancel,
        });
        async move { decode(pending.await?) }
    }

    /// `get-def --json <file> <line> <col>`
    pub fn definition(
        &self,
        file: &Path,
        contents: &str,
        position: Position,
        cancel: Option<CancellationToken>,
    ) -> impl Future<Output = Result<Option<DefinitionResponse>, CheckerError>> + Send + 'static + use<> {
        let [line, column] = position_args(position);
        let pending = self.exec(Request {
            file: file.to_path_buf(),
            contents: Some(contents.to_string()),
            args: vec![
                "get-def".to_string(),
                "--json".to_string(),
                file_arg(file),
                line,
                column,
            ],
            cancel,
        });
        async move { decode(pending.await?) }
    }

    /// `coverage --json <file>`
    pub fn coverage(
        &self,
        file: &Path,
        contents: &str,
        cancel: Option<CancellationToken>,
    ) -> impl Future<Output = Result<Option<CoverageResponse>, CheckerError>> + Send + 'static + use<> {
        let pending = self.exec(Request {
            file: file.to_path_buf(),
            contents: Some(contents.to_string()),
            args: vec!["coverage".to_string(), "--json".to_string(), file_arg(file)],
            cancel,
        });
        async move { decode(pending.await?) }
    }
}
