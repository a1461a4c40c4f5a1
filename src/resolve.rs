//! Key to sharded-path resolution
//!
//! A logical key maps to `/<seg 1>/.../<seg N>/<digest><suffix>`, where
//! the segments are consecutive slices of the hex digest. Fanning files
//! out across digest-prefix directories bounds per-directory entry
//! counts without a separate index. The mapping is deterministic but not
//! invertible, which is why every codec stores the key inside the file.

use std::hash::Hasher;

use crate::errors::{CacheError, RecoveryHint, Result};

pub const DEFAULT_SHARD_LEVELS: usize = 1;
pub const DEFAULT_SEGMENT_LEN: usize = 2;

/// Non-cryptographic key fingerprint algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// 64-bit FNV-1a, the default fingerprint.
    #[default]
    Fnv1a64,
    /// 64-bit xxHash.
    Xxh64,
}

impl HashAlgorithm {
    /// Lowercase hex digest of the key.
    pub fn digest(&self, key: &str) -> String {
        let fingerprint = match self {
            HashAlgorithm::Fnv1a64 => {
                let mut hasher = fnv::FnvHasher::default();
                hasher.write(key.as_bytes());
                hasher.finish()
            }
            HashAlgorithm::Xxh64 => xxhash_rust::xxh64::xxh64(key.as_bytes(), 0),
        };
        format!("{fingerprint:016x}")
    }

    /// Hex characters available for shard segments.
    pub fn digest_len(&self) -> usize {
        16
    }
}

/// Deterministic key to relative-path mapping.
#[derive(Debug, Clone)]
pub struct PathResolver {
    algorithm: HashAlgorithm,
    levels: usize,
    segment_len: usize,
}

impl PathResolver {
    /// Build a resolver, rejecting shard geometry that would need more
    /// hex characters than the digest provides.
    pub fn new(algorithm: HashAlgorithm, levels: usize, segment_len: usize) -> Result<Self> {
        let needed = levels * segment_len;
        if needed > algorithm.digest_len() {
            return Err(CacheError::Configuration {
                message: format!(
                    "shard geometry {levels}x{segment_len} needs {needed} hex characters, \
                     digest only has {}",
                    algorithm.digest_len()
                ),
                recovery_hint: RecoveryHint::Manual {
                    instructions: "reduce shard levels or segment length".to_string(),
                },
            });
        }
        Ok(Self {
            algorithm,
            levels,
            segment_len,
        })
    }

    /// Map a key to its relative path, beginning with a separator.
    pub fn resolve(&self, suffix: &str, key: &str) -> String {
        let digest = self.algorithm.digest(key);
        let mut path = String::with_capacity(
            self.levels * (self.segment_len + 1) + 1 + digest.len() + suffix.len(),
        );
        for level in 0..self.levels {
            path.push('/');
            path.push_str(&digest[level * self.segment_len..(level + 1) * self.segment_len]);
        }
        path.push('/');
        path.push_str(&digest);
        path.push_str(suffix);
        path
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        // Default geometry always fits a 64-bit digest.
        Self {
            algorithm: HashAlgorithm::default(),
            levels: DEFAULT_SHARD_LEVELS,
            segment_len: DEFAULT_SEGMENT_LEN,
        }
    }
}
