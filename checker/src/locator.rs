//! Binary discovery with a per-directory cache.
//!
//! Resolving a directory caches the answer (including "not found") for that
//! directory and every ancestor up to its project root, so sibling files share
//! one lookup. A one-shot watch on the resolved binary, or on the project's
//! `package.json` when nothing was found, purges that chain on the first change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::task::AbortHandle;

use crate::root::{PROJECT_MARKER, find_project_root};
use crate::watch::{FileWatcher, WatchEvent};

/// Cached answer for a directory. `None` is the "looked, found nothing" marker.
type CacheMap = HashMap<PathBuf, Option<PathBuf>>;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{package} in {} ships no {binary} binary for this platform", dir.display())]
    NoBinary {
        package: String,
        binary: String,
        dir: PathBuf,
    },
}

/// Strategy for finding the checker binary relative to a directory.
pub trait BinaryDiscovery: Send + Sync {
    /// `Ok(None)` means "not installed", which is not an error.
    fn discover(&self, dir: &Path) -> Result<Option<PathBuf>, DiscoveryError>;
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    version: String,
}

/// Node-style resolution of the package that ships the checker binary.
///
/// Walks `dir` and its ancestors looking for `node_modules/<package>`. The
/// first package found wins; its platform directory
/// (`<binary>-<platform>-v<version>/<binary>`) is preferred over the
/// `node_modules/.bin` shim next to it.
#[derive(Debug, Clone)]
pub struct NodeModulesDiscovery {
    package: String,
    binary: String,
    search_path: bool,
}

impl NodeModulesDiscovery {
    #[must_use]
    pub fn new(package: impl Into<String>, binary: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            binary: binary.into(),
            search_path: false,
        }
    }

    /// Fall back to the binary on `PATH` when no package is installed.
    #[must_use]
    pub fn with_search_path(mut self, search_path: bool) -> Self {
        self.search_path = search_path;
        self
    }

    fn executable_name(&self) -> String {
        format!("{}{}", self.binary, std::env::consts::EXE_SUFFIX)
    }

    fn platform_dir(&self, version: &str) -> Option<String> {
        let platform = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("macos", "aarch64") => "osx-arm64",
            ("macos", _) => "osx",
            ("linux", "aarch64") => "linux-arm64",
            ("linux", "x86_64") => "linux64",
            ("windows", "x86_64") => "win64",
            _ => return None,
        };
        Some(format!("{}-{platform}-v{version}", self.binary))
    }

    fn resolve_package(&self, node_modules: &Path) -> Result<Option<PathBuf>, DiscoveryError> {
        let package_dir = node_modules.join(&self.package);
        let manifest_path = package_dir.join(PROJECT_MARKER);
        if !manifest_path.is_file() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&manifest_path).map_err(|source| {
            DiscoveryError::Read {
                path: manifest_path.clone(),
                source,
            }
        })?;
        let manifest: PackageManifest =
            serde_json::from_str(&raw).map_err(|source| DiscoveryError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;

        if let Some(platform_dir) = self.platform_dir(&manifest.version) {
            let candidate = package_dir.join(platform_dir).join(self.executable_name());
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }

        let shim = node_modules.join(".bin").join(self.executable_name());
        if shim.is_file() {
            return Ok(Some(shim));
        }

        Err(DiscoveryError::NoBinary {
            package: self.package.clone(),
            binary: self.binary.clone(),
            dir: package_dir,
        })
    }
}

impl Default for NodeModulesDiscovery {
    fn default() -> Self {
        Self::new("flow-bin", "flow")
    }
}

impl BinaryDiscovery for NodeModulesDiscovery {
    fn discover(&self, dir: &Path) -> Result<Option<PathBuf>, DiscoveryError> {
        for ancestor in dir.ancestors() {
            let node_modules = ancestor.join("node_modules");
            if !node_modules.is_dir() {
                continue;
            }
            if let Some(found) = self.resolve_package(&node_modules)? {
                return Ok(Some(found));
            }
        }

        if self.search_path {
            return Ok(which::which(&self.binary).ok());
        }
        Ok(None)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Directories sharing one cache entry with `dir`: `dir` itself and its
/// ancestors up to the project root inclusive, both as given and
/// symlink-resolved. Also returns the project root.
fn cache_chain(dir: &Path) -> (Vec<PathBuf>, PathBuf) {
    let real = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let root = find_project_root(&real).unwrap_or_else(|| real.clone());

    let mut chain = Vec::new();
    let mut given = Some(dir);
    for real_dir in real.ancestors() {
        chain.push(real_dir.to_path_buf());
        if let Some(given_dir) = given {
            if given_dir != real_dir {
                chain.push(given_dir.to_path_buf());
            }
            given = given_dir.parent();
        }
        if real_dir == root {
            break;
        }
    }
    (chain, root)
}

fn purge(cache: &Mutex<CacheMap>, chain: &[PathBuf]) {
    let mut cache = lock(cache);
    for dir in chain {
        cache.remove(dir);
    }
}

/// Resolves the checker binary per directory, caching up to the project root.
pub struct BinaryLocator {
    discovery: Arc<dyn BinaryDiscovery>,
    watcher: Arc<dyn FileWatcher>,
    cache: Arc<Mutex<CacheMap>>,
    /// Live invalidation watches, keyed by the directory that was resolved.
    watches: Mutex<HashMap<PathBuf, AbortHandle>>,
}

impl BinaryLocator {
    pub fn new(discovery: Arc<dyn BinaryDiscovery>, watcher: Arc<dyn FileWatcher>) -> Self {
        Self {
            discovery,
            watcher,
            cache: Arc::new(Mutex::new(HashMap::new())),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Path to the checker binary for files in `dir`, or `None` when it is not
    /// installed. Discovery errors are logged and cached as "not found".
    pub fn resolve(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(cached) = self.cached(dir) {
            return cached;
        }

        let result = match self.discovery.discover(dir) {
            Ok(Some(binary)) => {
                tracing::info!(
                    dir = %dir.display(),
                    binary = %binary.display(),
                    "Found flow binary"
                );
                Some(binary)
            }
            Ok(None) => {
                tracing::info!(dir = %dir.display(), "No flow binary found");
                None
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Flow binary discovery failed: {e}");
                None
            }
        };

        let (chain, root) = cache_chain(dir);
        {
            let mut cache = lock(&self.cache);
            for entry in &chain {
                cache.insert(entry.clone(), result.clone());
            }
        }

        let watched = result
            .clone()
            .unwrap_or_else(|| root.join(PROJECT_MARKER));
        self.watch_for_changes(dir, watched, chain);

        result
    }

    /// Cached answer for `dir`: `None` when never resolved, `Some(None)` for
    /// the not-found marker.
    #[must_use]
    pub fn cached(&self, dir: &Path) -> Option<Option<PathBuf>> {
        lock(&self.cache).get(dir).cloned()
    }

    /// Forget the cached answer for `dir` and its chain up to the project root.
    pub fn invalidate(&self, dir: &Path) {
        let (chain, _) = cache_chain(dir);
        purge(&self.cache, &chain);
        if let Some(handle) = lock(&self.watches).remove(dir) {
            handle.abort();
        }
    }

    fn watch_for_changes(&self, dir: &Path, watched: PathBuf, chain: Vec<PathBuf>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                path = %watched.display(),
                "No async runtime; binary cache will not be invalidated on change"
            );
            return;
        };

        let subscription = match self.watcher.watch_once(&watched) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!("Error watching {}: {e}", watched.display());
                return;
            }
        };

        let cache = Arc::clone(&self.cache);
        let task = runtime.spawn(async move {
            match subscription.fired().await {
                WatchEvent::Changed => {
                    tracing::info!(path = %watched.display(), "Changed, purging flow binary cache");
                }
                WatchEvent::Failed(msg) => {
                    tracing::warn!("Error watching {}: {msg}", watched.display());
                }
            }
            purge(&cache, &chain);
        });

        let mut watches = lock(&self.watches);
        watches.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = watches.insert(dir.to_path_buf(), task.abort_handle()) {
            previous.abort();
        }
    }
}

impl Drop for BinaryLocator {
    fn drop(&mut self) {
        for (_, handle) in lock(&self.watches).drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::ManualWatcher;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDiscovery {
        calls: AtomicUsize,
        answer: Option<PathBuf>,
    }

    impl CountingDiscovery {
        fn new(answer: Option<PathBuf>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BinaryDiscovery for CountingDiscovery {
        fn discover(&self, _dir: &Path) -> Result<Option<PathBuf>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    struct FailingDiscovery;

    impl BinaryDiscovery for FailingDiscovery {
        fn discover(&self, dir: &Path) -> Result<Option<PathBuf>, DiscoveryError> {
            Err(DiscoveryError::NoBinary {
                package: "flow-bin".to_string(),
                binary: "flow".to_string(),
                dir: dir.to_path_buf(),
            })
        }
    }

    /// `<tmp>/proj/package.json` with `<tmp>/proj/src/components` below it.
    /// Paths are canonical so the given and real chains coincide.
    fn project() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap().join("proj");
        let nested = root.join("src").join("components");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join(PROJECT_MARKER), "{}").unwrap();
        (dir, root, nested)
    }

    fn write_executable(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\n").unwrap();
    }

    #[test]
    fn resolve_populates_chain_up_to_root() {
        let (_tmp, root, nested) = project();
        let binary = root.join("node_modules/.bin/flow");
        let discovery = Arc::new(CountingDiscovery::new(Some(binary.clone())));
        let locator = BinaryLocator::new(discovery.clone(), Arc::new(ManualWatcher::new()));

        assert_eq!(locator.resolve(&nested), Some(binary.clone()));
        assert_eq!(locator.cached(&nested), Some(Some(binary.clone())));
        assert_eq!(locator.cached(&root.join("src")), Some(Some(binary.clone())));
        assert_eq!(locator.cached(&root), Some(Some(binary.clone())));
        assert_eq!(locator.cached(root.parent().unwrap()), None);

        assert_eq!(locator.resolve(&root.join("src")), Some(binary));
        assert_eq!(discovery.calls(), 1);
    }

    #[test]
    fn not_found_is_cached() {
        let (_tmp, _root, nested) = project();
        let discovery = Arc::new(CountingDiscovery::new(None));
        let locator = BinaryLocator::new(discovery.clone(), Arc::new(ManualWatcher::new()));

        assert_eq!(locator.resolve(&nested), None);
        assert_eq!(locator.cached(&nested), Some(None));
        assert_eq!(locator.resolve(&nested), None);
        assert_eq!(discovery.calls(), 1);
    }

    #[test]
    fn discovery_error_is_cached_as_not_found() {
        let (_tmp, _root, nested) = project();
        let locator = BinaryLocator::new(Arc::new(FailingDiscovery), Arc::new(ManualWatcher::new()));
        assert_eq!(locator.resolve(&nested), None);
        assert_eq!(locator.cached(&nested), Some(None));
    }

    #[tokio::test]
    async fn watch_change_purges_chain() {
        let (_tmp, root, nested) = project();
        let binary = root.join("node_modules/.bin/flow");
        let discovery = Arc::new(CountingDiscovery::new(Some(binary.clone())));
        let watcher = Arc::new(ManualWatcher::new());
        let locator = BinaryLocator::new(discovery.clone(), watcher.clone());

        locator.resolve(&nested);
        assert_eq!(watcher.watched(), vec![binary.clone()]);

        assert_eq!(watcher.fire(&binary, &WatchEvent::Changed), 1);
        for _ in 0..50 {
            if locator.cached(&nested).is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(locator.cached(&nested), None);
        assert_eq!(locator.cached(&root), None);

        locator.resolve(&nested);
        assert_eq!(discovery.calls(), 2);
        assert_eq!(watcher.watched(), vec![binary]);
    }

    #[tokio::test]
    async fn not_found_watches_project_manifest() {
        let (_tmp, root, nested) = project();
        let watcher = Arc::new(ManualWatcher::new());
        let locator = BinaryLocator::new(Arc::new(CountingDiscovery::new(None)), watcher.clone());

        locator.resolve(&nested);
        assert_eq!(watcher.watched(), vec![root.join(PROJECT_MARKER)]);
    }

    #[tokio::test]
    async fn watch_error_also_purges() {
        let (_tmp, root, nested) = project();
        let watcher = Arc::new(ManualWatcher::new());
        let locator = BinaryLocator::new(Arc::new(CountingDiscovery::new(None)), watcher.clone());

        locator.resolve(&nested);
        watcher.fire(&root.join(PROJECT_MARKER), &WatchEvent::Failed("gone".to_string()));
        for _ in 0..50 {
            if locator.cached(&nested).is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(locator.cached(&nested), None);
    }

    #[tokio::test]
    async fn fired_watches_are_dropped() {
        let (_tmp, root, nested) = project();
        let watcher = Arc::new(ManualWatcher::new());
        let locator = BinaryLocator::new(Arc::new(CountingDiscovery::new(None)), watcher.clone());

        locator.resolve(&nested);
        watcher.fire(&root.join(PROJECT_MARKER), &WatchEvent::Changed);
        for _ in 0..50 {
            if locator.cached(&nested).is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let src = root.join("src");
        locator.resolve(&src);
        let watched: Vec<PathBuf> = lock(&locator.watches).keys().cloned().collect();
        assert_eq!(watched, vec![src]);
    }

    #[test]
    fn invalidate_forces_rediscovery() {
        let (_tmp, _root, nested) = project();
        let discovery = Arc::new(CountingDiscovery::new(None));
        let locator = BinaryLocator::new(discovery.clone(), Arc::new(ManualWatcher::new()));

        locator.resolve(&nested);
        locator.invalidate(&nested);
        assert_eq!(locator.cached(&nested), None);
        locator.resolve(&nested);
        assert_eq!(discovery.calls(), 2);
    }

    #[test]
    fn node_modules_prefers_platform_binary() {
        let (_tmp, root, nested) = project();
        let package = root.join("node_modules").join("flow-bin");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join(PROJECT_MARKER), r#"{"name":"flow-bin","version":"0.200.0"}"#)
            .unwrap();

        let discovery = NodeModulesDiscovery::default();
        let shim = root.join("node_modules/.bin").join(discovery.executable_name());
        write_executable(&shim);

        match discovery.platform_dir("0.200.0") {
            Some(platform_dir) => {
                let native = package.join(platform_dir).join(discovery.executable_name());
                write_executable(&native);
                assert_eq!(discovery.discover(&nested).unwrap(), Some(native));
            }
            None => assert_eq!(discovery.discover(&nested).unwrap(), Some(shim)),
        }
    }

    #[test]
    fn node_modules_falls_back_to_shim() {
        let (_tmp, root, nested) = project();
        let package = root.join("node_modules").join("flow-bin");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join(PROJECT_MARKER), r#"{"version":"0.200.0"}"#).unwrap();

        let discovery = NodeModulesDiscovery::default();
        let shim = root.join("node_modules/.bin").join(discovery.executable_name());
        write_executable(&shim);

        assert_eq!(discovery.discover(&nested).unwrap(), Some(shim));
    }

    #[test]
    fn node_modules_without_binary_is_an_error() {
        let (_tmp, root, nested) = project();
        let package = root.join("node_modules").join("flow-bin");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join(PROJECT_MARKER), r#"{"version":"0.200.0"}"#).unwrap();

        let err = NodeModulesDiscovery::default().discover(&nested).unwrap_err();
        assert!(matches!(err, DiscoveryError::NoBinary { .. }));
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let (_tmp, root, nested) = project();
        let package = root.join("node_modules").join("flow-bin");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join(PROJECT_MARKER), "not json").unwrap();

        let err = NodeModulesDiscovery::default().discover(&nested).unwrap_err();
        assert!(matches!(err, DiscoveryError::Manifest { .. }));
    }

    #[test]
    fn missing_package_is_not_found() {
        let (_tmp, _root, nested) = project();
        let discovery = NodeModulesDiscovery::new("definitely-not-installed-pkg", "nope-bin");
        assert_eq!(discovery.discover(&nested).unwrap(), None);
    }
}
