//! Leaf-only recursive walk over the cache root
//!
//! Bulk operations are O(total entries) by design; there is no index to
//! consult and none is wanted. A missing root is an empty set, not an
//! error. The first unrecoverable I/O error is yielded once and fuses
//! the iterator, matching the abort-on-failure policy of the bulk
//! operations driving the walk.

use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use crate::errors::{CacheError, Result};

/// Lazily yields every file underneath `root`, depth-first. Each stack
/// frame keeps the directory path alongside its iterator so errors can
/// name where they happened.
pub struct TreeWalker {
    stack: Vec<(PathBuf, ReadDir)>,
    /// Subtree excluded from the walk (the engine's temp directory).
    skip: Option<PathBuf>,
    fused: bool,
}

impl TreeWalker {
    pub fn new(root: &Path, skip: Option<PathBuf>) -> Result<Self> {
        let stack = match fs::read_dir(root) {
            Ok(dir) => vec![(root.to_path_buf(), dir)],
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CacheError::io(root, "read cache root", e)),
        };
        Ok(Self {
            stack,
            skip,
            fused: false,
        })
    }
}

impl Iterator for TreeWalker {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        while let Some((dir_path, dir)) = self.stack.last_mut() {
            let entry = match dir.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    let dir_path = dir_path.clone();
                    self.fused = true;
                    return Some(Err(CacheError::io(dir_path, "read cache directory", e)));
                }
            };

            let path = entry.path();
            if self.skip.as_deref() == Some(path.as_path()) {
                continue;
            }
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    self.fused = true;
                    return Some(Err(CacheError::io(path, "stat directory entry", e)));
                }
            };
            if file_type.is_dir() {
                match fs::read_dir(&path) {
                    Ok(sub) => self.stack.push((path, sub)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        // Pruned by a concurrent cleanup; skip it.
                        tracing::warn!(path = %path.display(), "directory vanished mid-walk");
                    }
                    Err(e) => {
                        self.fused = true;
                        return Some(Err(CacheError::io(path, "read cache directory", e)));
                    }
                }
            } else if file_type.is_file() {
                return Some(Ok(path));
            }
        }
        None
    }
}

/// Remove now-empty directories underneath `root`, bottom-up. The root
/// itself is kept. Failures are tolerated: a directory that gained an
/// entry since the walk simply stays.
pub fn prune_empty_dirs(root: &Path) -> Result<()> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CacheError::io(root, "read cache root", e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(root, "read cache directory", e))?;
        let path = entry.path();
        if path.is_dir() {
            prune_dir(&path);
        }
    }
    Ok(())
}

fn prune_dir(dir: &Path) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                prune_dir(&path);
            }
        }
    }
    let empty = match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    };
    if !empty {
        return;
    }
    match fs::remove_dir(dir) {
        Ok(()) => {}
        // A concurrent writer may repopulate the directory between the
        // emptiness check and the removal.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "failed to prune directory");
        }
    }
}
