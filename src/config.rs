//! File cache configuration
//!
//! Plain struct plus a builder; everything that can be validated is
//! validated when the engine is constructed, not when the first
//! operation runs.

use std::path::PathBuf;

use crate::codec::CodecKind;
use crate::entry::WriteStrategy;
use crate::resolve::{HashAlgorithm, DEFAULT_SEGMENT_LEN, DEFAULT_SHARD_LEVELS};

/// Configuration surface of the file storage engine.
#[derive(Debug, Clone)]
pub struct FileCacheConfig {
    /// Root directory all entries live under.
    pub root: PathBuf,
    /// Where the atomic strategy stages temp files. Must be on the same
    /// filesystem as `root` for the rename to stay atomic; the default
    /// (`<root>/tmp`) guarantees that.
    pub temp_dir: PathBuf,
    /// On-disk format.
    pub codec: CodecKind,
    /// Concurrency strategy.
    pub strategy: WriteStrategy,
    /// Key fingerprint algorithm for path resolution.
    pub algorithm: HashAlgorithm,
    /// Number of shard directory levels.
    pub shard_levels: usize,
    /// Hex characters per shard directory name.
    pub segment_len: usize,
    /// Unix permission bits applied to created cache files.
    pub file_mode: Option<u32>,
    /// Unix permission bits applied to created shard directories.
    pub dir_mode: Option<u32>,
}

impl FileCacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let temp_dir = root.join("tmp");
        Self {
            root,
            temp_dir,
            codec: CodecKind::default(),
            strategy: WriteStrategy::default(),
            algorithm: HashAlgorithm::default(),
            shard_levels: DEFAULT_SHARD_LEVELS,
            segment_len: DEFAULT_SEGMENT_LEN,
            file_mode: None,
            dir_mode: None,
        }
    }

    pub fn builder(root: impl Into<PathBuf>) -> FileCacheConfigBuilder {
        FileCacheConfigBuilder {
            config: Self::new(root),
        }
    }
}

/// Builder for [`FileCacheConfig`].
pub struct FileCacheConfigBuilder {
    config: FileCacheConfig,
}

impl FileCacheConfigBuilder {
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = temp_dir.into();
        self
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn with_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    pub fn with_shard_geometry(mut self, levels: usize, segment_len: usize) -> Self {
        self.config.shard_levels = levels;
        self.config.segment_len = segment_len;
        self
    }

    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.config.file_mode = Some(mode);
        self
    }

    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.config.dir_mode = Some(mode);
        self
    }

    pub fn build(self) -> FileCacheConfig {
        self.config
    }
}
