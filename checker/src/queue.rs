//! Per-project serialization of checker invocations.
//!
//! The checker runs one server per project; hammering it with parallel CLI
//! calls only makes every call slower. [`ProjectQueue`] therefore chains
//! admissions per project root so that at most one task per root is running,
//! in admission order. Roots are independent of each other.
//!
//! Admitted tasks are spawned immediately, so the chain keeps moving even if a
//! caller never polls (or drops) the future it got back.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::CheckerError;
use crate::runner::CheckerOutput;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// End of the most recently admitted task for a root. The sender side lives in
/// that task and is dropped when it settles, however it settles.
struct Tail {
    ticket: u64,
    settled: oneshot::Receiver<()>,
}

#[derive(Default)]
pub struct ProjectQueue {
    tails: Arc<Mutex<HashMap<PathBuf, Tail>>>,
    next_ticket: AtomicU64,
}

impl ProjectQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after every task previously admitted for `root` has settled.
    ///
    /// A failed or canceled predecessor still counts as settled. The returned
    /// future carries the task's own result. Must be called inside a tokio
    /// runtime.
    pub fn admit<F, Fut, T>(
        &self,
        root: &Path,
        task: F,
    ) -> impl Future<Output = Result<T, CheckerError>> + Send + 'static + use<F, Fut, T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CheckerError>> + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (settle_tx, settled) = oneshot::channel::<()>();
        let previous = lock(&self.tails).insert(root.to_path_buf(), Tail { ticket, settled });

        let tails = Arc::clone(&self.tails);
        let root = root.to_path_buf();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                // Err just means the predecessor's task is gone; it settled.
                let _ = previous.settled.await;
            }
            let result = task().await;

            {
                let mut tails = lock(&tails);
                if tails.get(&root).is_some_and(|tail| tail.ticket == ticket) {
                    tails.remove(&root);
                }
            }
            drop(settle_tx);
            result
        });

        async move {
            handle.await.map_err(|e| CheckerError::TaskFailed {
                message: e.to_string(),
            })?
        }
    }

    /// Number of roots with a task admitted and not yet settled.
    #[must_use]
    pub fn busy_roots(&self) -> usize {
        lock(&self.tails).len()
    }
}

pub type SharedStatus = Shared<BoxFuture<'static, Result<CheckerOutput, CheckerError>>>;

struct InFlight {
    ticket: u64,
    result: SharedStatus,
}

/// Exclusion group for whole-project status polls.
///
/// Polls are serialized per root in their own [`ProjectQueue`], separate from
/// interactive requests, and de-duplicated: while a poll for a root is
/// outstanding every caller shares its result.
#[derive(Default)]
pub struct StatusGate {
    queue: ProjectQueue,
    in_flight: Arc<Mutex<HashMap<PathBuf, InFlight>>>,
    next_ticket: AtomicU64,
}

impl StatusGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the outstanding poll for `root`, or start one with `task`.
    pub fn poll<F, Fut>(&self, root: &Path, task: F) -> SharedStatus
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CheckerOutput, CheckerError>> + Send + 'static,
    {
        // Held across admission so the task cannot finish and clear its entry
        // before the entry exists.
        let mut in_flight = lock(&self.in_flight);
        if let Some(existing) = in_flight.get(root) {
            tracing::debug!(root = %root.display(), "Joining in-flight status check");
            return existing.result.clone();
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let table = Arc::clone(&self.in_flight);
        let key = root.to_path_buf();
        let pending = self.queue.admit(root, move || async move {
            let result = task().await;
            let mut table = lock(&table);
            if table.get(&key).is_some_and(|entry| entry.ticket == ticket) {
                table.remove(&key);
            }
            result
        });

        let result = pending.boxed().shared();
        in_flight.insert(
            root.to_path_buf(),
            InFlight {
                ticket,
                result: result.clone(),
            },
        );
        result
    }

    /// Whether a status poll for `root` is outstanding.
    #[must_use]
    pub fn is_polling(&self, root: &Path) -> bool {
        lock(&self.in_flight).contains_key(root)
    }
}
