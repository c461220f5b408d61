//! One-shot filesystem watches.
//!
//! A [`WatchSubscription`] resolves at most once, on the first change to the
//! watched path or on a watcher error. Dropping the subscription tears the
//! watch down. Re-subscribing after it fired is the caller's job.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use notify::{EventKind, RecursiveMode, Watcher as _};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The path was written, created or removed.
    Changed,
    /// The watcher reported an error or went away.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("creating file watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("watching {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Pending one-shot notification plus whatever keeps the watch alive.
pub struct WatchSubscription {
    rx: oneshot::Receiver<WatchEvent>,
    _guard: Box<dyn Any + Send>,
}

impl WatchSubscription {
    pub fn new(rx: oneshot::Receiver<WatchEvent>, guard: Box<dyn Any + Send>) -> Self {
        Self { rx, _guard: guard }
    }

    /// Wait for the watch to fire. The watch is released when this returns.
    pub async fn fired(self) -> WatchEvent {
        let Self { rx, _guard } = self;
        match rx.await {
            Ok(event) => event,
            Err(_) => WatchEvent::Failed("watcher closed".to_string()),
        }
    }
}

pub trait FileWatcher: Send + Sync {
    fn watch_once(&self, path: &Path) -> Result<WatchSubscription, WatchError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

/// [`FileWatcher`] backed by the platform watcher from `notify`.
///
/// Paths that do not exist yet (a `package.json` that has not been written)
/// are watched through their parent directory, with events filtered down to
/// the requested path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcher;

impl FileWatcher for NotifyWatcher {
    fn watch_once(&self, path: &Path) -> Result<WatchSubscription, WatchError> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        let target = path.to_path_buf();
        let (watch_path, filtered) = match path.parent() {
            Some(parent) if !path.exists() => (parent.to_path_buf(), true),
            _ => (target.clone(), false),
        };
        // Some backends report canonical paths (/private/var vs /var on macOS).
        let canonical_target = path
            .parent()
            .and_then(|parent| parent.canonicalize().ok())
            .zip(path.file_name())
            .map(|(parent, name)| parent.join(name));

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let event = match res {
                    Ok(event) => {
                        if !is_change(&event.kind) {
                            return;
                        }
                        if filtered
                            && !event
                                .paths
                                .iter()
                                .any(|p| p == &target || canonical_target.as_ref() == Some(p))
                        {
                            return;
                        }
                        WatchEvent::Changed
                    }
                    Err(err) => WatchEvent::Failed(err.to_string()),
                };
                if let Some(tx) = lock(&tx).take() {
                    let _ = tx.send(event);
                }
            })
            .map_err(WatchError::Init)?;

        watcher
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: watch_path.clone(),
                source,
            })?;

        Ok(WatchSubscription::new(rx, Box::new(watcher)))
    }
}

/// [`FileWatcher`] whose events are fired by hand.
///
/// Hosts that get change notifications from elsewhere (an editor's own file
/// events) and tests use this to drive cache invalidation deterministically.
#[derive(Default)]
pub struct ManualWatcher {
    pending: Mutex<Vec<(PathBuf, oneshot::Sender<WatchEvent>)>>,
}

impl ManualWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths with an armed (not yet fired, not dropped) watch.
    #[must_use]
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut pending = lock(&self.pending);
        pending.retain(|(_, tx)| !tx.is_closed());
        pending.iter().map(|(path, _)| path.clone()).collect()
    }

    /// Fire every armed watch on `path`. Returns how many subscriptions were
    /// notified.
    pub fn fire(&self, path: &Path, event: &WatchEvent) -> usize {
        let mut pending = lock(&self.pending);
        let mut fired = 0;
        let mut kept = Vec::with_capacity(pending.len());
        for (watched, tx) in pending.drain(..) {
            if watched == path {
                if tx.send(event.clone()).is_ok() {
                    fired += 1;
                }
            } else {
                kept.push((watched, tx));
            }
        }
        *pending = kept;
        fired
    }
}

impl FileWatcher for ManualWatcher {
    fn watch_once(&self, path: &Path) -> Result<WatchSubscription, WatchError> {
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).push((path.to_path_buf(), tx));
        Ok(WatchSubscription::new(rx, Box::new(())))
    }
}
