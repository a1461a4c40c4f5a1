//! Entry construction
//!
//! The factory owns the codec, the path resolver, and the strategy
//! configuration, and builds one boxed [`StoreEntry`] per logical
//! operation or per discovered file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{AtomicEntry, LockedEntry, StoreEntry};
use crate::codec::FormatCodec;
use crate::resolve::PathResolver;

/// Concurrency strategy selected at factory construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// Write to a temp file, install with one atomic rename.
    #[default]
    Atomic,
    /// Write in place under advisory locks with shared-to-exclusive
    /// upgrade.
    Locked,
}

pub struct EntryFactory {
    codec: Arc<dyn FormatCodec>,
    resolver: PathResolver,
    strategy: WriteStrategy,
    temp_dir: PathBuf,
    file_mode: Option<u32>,
    dir_mode: Option<u32>,
}

impl EntryFactory {
    pub fn new(
        codec: Arc<dyn FormatCodec>,
        resolver: PathResolver,
        strategy: WriteStrategy,
        temp_dir: PathBuf,
        file_mode: Option<u32>,
        dir_mode: Option<u32>,
    ) -> Self {
        Self {
            codec,
            resolver,
            strategy,
            temp_dir,
            file_mode,
            dir_mode,
        }
    }

    /// Relative path (separator-prefixed) an entry for `key` lives at.
    pub fn relative_path(&self, key: &str) -> String {
        self.resolver.resolve(self.codec.filename_suffix(), key)
    }

    /// Build an entry bound to the resolved path of `key` under `root`.
    pub fn entry_for_key(&self, root: &Path, key: &str) -> Box<dyn StoreEntry> {
        let relative = self.relative_path(key);
        self.entry_for_path(root.join(relative.trim_start_matches('/')))
    }

    /// Build an entry bound to an already known path (tree walks).
    pub fn entry_for_path(&self, path: PathBuf) -> Box<dyn StoreEntry> {
        match self.strategy {
            WriteStrategy::Atomic => Box::new(AtomicEntry::new(
                Arc::clone(&self.codec),
                path,
                self.temp_dir.clone(),
                self.file_mode,
                self.dir_mode,
            )),
            WriteStrategy::Locked => Box::new(LockedEntry::new(
                Arc::clone(&self.codec),
                path,
                self.file_mode,
                self.dir_mode,
            )),
        }
    }
}
