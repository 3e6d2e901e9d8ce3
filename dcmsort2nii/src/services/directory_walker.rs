//! Leaf directory discovery
//!
//! A leaf is a directory with no subdirectories. Directories holding both
//! files and subdirectories are not processed directly.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Leaf directory with its position relative to the walk root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafDirectory {
    pub path: PathBuf,
    /// Empty when the root itself is a leaf
    pub relative: PathBuf,
}

impl LeafDirectory {
    /// Mirror of this leaf under `output_root`
    pub fn mirrored_under(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.relative)
    }
}

/// Walk `root` and collect every leaf directory
///
/// Entries that cannot be accessed are logged and skipped. Order is by file
/// name at each level.
pub fn find_leaf_directories(root: &Path) -> Vec<LeafDirectory> {
    let mut leaves = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        if has_subdirectory(entry.path()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(Path::new(""))
            .to_path_buf();

        leaves.push(LeafDirectory {
            path: entry.path().to_path_buf(),
            relative,
        });
    }

    tracing::debug!(root = %root.display(), leaves = leaves.len(), "Leaf discovery complete");
    leaves
}

/// Whether `dir` has at least one child directory (symlinks not followed)
fn has_subdirectory(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .any(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false)),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot list directory");
            false
        }
    }
}
