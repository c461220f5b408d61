//! Flow CLI orchestration.
//!
//! Everything that talks to the external checker lives here: locating the
//! binary for a project, serializing invocations per project root, spawning the
//! process with cancellation, and decoding its JSON output. Editor-facing code
//! goes through [`FlowClient`] only.

pub mod error;
pub mod locator;
pub mod queue;
pub mod root;
pub mod runner;
pub mod watch;

mod client;

pub use client::{CheckerOptions, FlowClient};
pub use error::{CheckerError, ExitReason};
pub use locator::{BinaryDiscovery, BinaryLocator, DiscoveryError, NodeModulesDiscovery};
pub use queue::{ProjectQueue, StatusGate};
pub use root::{PROJECT_MARKER, find_project_root, project_root_for_file};
pub use runner::{CheckerOutput, Invocation, SkipReason};
pub use watch::{FileWatcher, ManualWatcher, NotifyWatcher, WatchError, WatchEvent, WatchSubscription};

pub use tokio_util::sync::CancellationToken;
