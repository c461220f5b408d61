//! Project root detection.

use std::path::{Path, PathBuf};

/// File whose presence marks a project root.
pub const PROJECT_MARKER: &str = "package.json";

/// Nearest ancestor of `start` (inclusive) that contains [`PROJECT_MARKER`].
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
}

/// Queue key for a file: its project root, or the file's own directory when no
/// marker exists anywhere above it.
#[must_use]
pub fn project_root_for_file(file: &Path) -> PathBuf {
    let dir = file.parent().unwrap_or(file);
    find_project_root(dir).unwrap_or_else(|| dir.to_path_buf())
}
