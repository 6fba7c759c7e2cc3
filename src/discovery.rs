//! Working copy discovery
//!
//! Finds git working copies below a workspace root. Workspaces usually group
//! repositories in one layer of category folders (`work/`, `personal/`), so the
//! search covers the root's children and grandchildren and stops there.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::git::is_working_copy;

/// Deepest level below the root that is searched
pub const MAX_DEPTH: usize = 2;

/// A directory known to contain a git working copy
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkingCopy {
    pub path: PathBuf,
}

impl WorkingCopy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Find every working copy at depth 1 or 2 below `root`, in lexical path order.
///
/// A directory that is itself a working copy is not searched further, and the
/// root is never reported. The directory tree is read fresh on every call.
pub fn discover_working_copies(root: &Path) -> Result<Vec<WorkingCopy>> {
    if !root.is_dir() {
        return Err(SyncError::NotFound(root.to_path_buf()));
    }

    let mut found = Vec::new();
    let top_level = list_subdirectories(root).map_err(|source| SyncError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    for dir in top_level {
        visit(&dir, 1, &mut found);
    }

    found.sort();
    debug!("Discovered {} working copies under {}", found.len(), root.display());
    Ok(found)
}

fn visit(dir: &Path, depth: usize, found: &mut Vec<WorkingCopy>) {
    if is_working_copy(dir) {
        found.push(WorkingCopy::new(dir));
        return;
    }

    if depth >= MAX_DEPTH {
        return;
    }

    match list_subdirectories(dir) {
        Ok(children) => {
            for child in children {
                visit(&child, depth + 1, found);
            }
        }
        Err(e) => warn!("Skipping unreadable directory {}: {}", dir.display(), e),
    }
}

/// Immediate subdirectories of `dir`, sorted, excluding `.git` itself
fn list_subdirectories(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }

    dirs.sort();
    Ok(dirs)
}
