//! File storage engine
//!
//! [`FileCache`] orchestrates the entry lifecycle across the cache root:
//! point operations resolve the key to an entry via the factory and
//! delegate; bulk operations walk the whole tree, build one entry per
//! discovered file, and aggregate. Bulk operations are not transactional
//! across the set: a failure partway through leaves already-processed
//! entries modified and the rest untouched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Expiration;
use crate::config::FileCacheConfig;
use crate::entry::{EntryFactory, StoreEntry};
use crate::errors::{CacheError, RecoveryHint, Result};
use crate::resolve::PathResolver;
use crate::walk::{prune_empty_dirs, TreeWalker};

pub struct FileCache {
    root: PathBuf,
    temp_dir: PathBuf,
    factory: EntryFactory,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("root", &self.root)
            .field("temp_dir", &self.temp_dir)
            .finish_non_exhaustive()
    }
}

impl FileCache {
    /// Build the engine, validating the shard geometry eagerly. The root
    /// directory is created lazily by the first write.
    pub fn new(config: FileCacheConfig) -> Result<Self> {
        let resolver = PathResolver::new(
            config.algorithm,
            config.shard_levels,
            config.segment_len,
        )?;
        let factory = EntryFactory::new(
            config.codec.codec(),
            resolver,
            config.strategy,
            config.temp_dir.clone(),
            config.file_mode,
            config.dir_mode,
        );
        Ok(Self {
            root: config.root,
            temp_dir: config.temp_dir,
            factory,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn factory(&self) -> &EntryFactory {
        &self.factory
    }

    fn with_entry<R>(
        &self,
        key: &str,
        op: impl FnOnce(&mut dyn StoreEntry) -> Result<R>,
    ) -> Result<R> {
        let mut entry = self.factory.entry_for_key(&self.root, key);
        let result = op(entry.as_mut());
        let closed = entry.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    fn walker(&self) -> Result<TreeWalker> {
        TreeWalker::new(&self.root, Some(self.temp_dir.clone()))
    }

    /// True when a valid, unexpired entry exists for `key`.
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.with_entry(key, |entry| entry.is_valid())
    }

    /// Read the payload for `key`. Missing, structurally invalid, and
    /// expired entries all read as `None`.
    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_entry(key, |entry| {
            if !entry.is_valid()? {
                return Ok(None);
            }
            entry.read_data().map(Some)
        })
    }

    /// Install a payload under `key`. A `ttl` of `None` or zero means
    /// the entry never expires. With `overwrite` unset, an existing
    /// valid entry fails with [`CacheError::AlreadyExists`] so callers
    /// can build add-if-absent semantics.
    pub fn write(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Option<Duration>,
        overwrite: bool,
    ) -> Result<()> {
        self.write_with_expiration(key, payload, Expiration::from_ttl(ttl), overwrite)
    }

    /// Same as [`write`](Self::write) with an absolute expiration.
    pub fn write_with_expiration(
        &self,
        key: &str,
        payload: &[u8],
        expires: Expiration,
        overwrite: bool,
    ) -> Result<()> {
        self.with_entry(key, |entry| entry.write(key, payload, expires, overwrite))
    }

    /// Remove the entry for `key`, whether valid or not. Absence is not
    /// an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.with_entry(key, |entry| entry.delete())
    }

    /// Delete every entry under the root, then prune empty shard
    /// directories bottom-up.
    pub fn clear(&self) -> Result<()> {
        for path in self.walker()? {
            let mut entry = self.factory.entry_for_path(path?);
            entry.delete()?;
        }
        prune_empty_dirs(&self.root)
    }

    /// Delete only stale entries: structurally invalid or expired. Fresh
    /// valid entries are never touched.
    pub fn cleanup(&self) -> Result<()> {
        let mut removed = 0usize;
        for path in self.walker()? {
            let mut entry = self.factory.entry_for_path(path?);
            if !entry.is_valid()? {
                entry.delete()?;
                removed += 1;
            }
            entry.close()?;
        }
        tracing::debug!(removed, "cache cleanup finished");
        prune_empty_dirs(&self.root)
    }

    /// Delete every entry that is invalid or whose stored key starts
    /// with `prefix` (byte-wise). An empty prefix behaves like
    /// [`clear`](Self::clear).
    pub fn filter(&self, prefix: &str) -> Result<()> {
        for path in self.walker()? {
            let mut entry = self.factory.entry_for_path(path?);
            let matches = if !entry.is_valid()? {
                true
            } else {
                match entry.read_key() {
                    Ok(key) => key.starts_with(prefix),
                    // The key region exists but cannot be decoded;
                    // treat the entry as stale.
                    Err(CacheError::Codec { .. }) => true,
                    Err(e) => return Err(e),
                }
            };
            if matches {
                entry.delete()?;
            }
            entry.close()?;
        }
        prune_empty_dirs(&self.root)
    }

    /// Lazily yield the stored key of every valid entry whose key starts
    /// with `prefix`, in unspecified order. Nothing is deleted.
    pub fn list_keys<'a>(&'a self, prefix: &str) -> Result<KeyIter<'a>> {
        Ok(KeyIter {
            walker: self.walker()?,
            factory: &self.factory,
            prefix: prefix.to_string(),
            fused: false,
        })
    }

    /// Serialize a value with bincode and store it under `key`.
    pub fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        overwrite: bool,
    ) -> Result<()> {
        let payload = bincode::serialize(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            source: Box::new(e),
            recovery_hint: RecoveryHint::Manual {
                instructions: "check that the value type serializes with bincode".to_string(),
            },
        })?;
        self.write(key, &payload, ttl, overwrite)
    }

    /// Read and deserialize the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(payload) = self.read(key)? else {
            return Ok(None);
        };
        let value = bincode::deserialize(&payload).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            source: Box::new(e),
            recovery_hint: RecoveryHint::ClearAndRetry,
        })?;
        Ok(Some(value))
    }
}

/// Iterator returned by [`FileCache::list_keys`].
pub struct KeyIter<'a> {
    walker: TreeWalker,
    factory: &'a EntryFactory,
    prefix: String,
    fused: bool,
}

impl Iterator for KeyIter<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        loop {
            let path = match self.walker.next()? {
                Ok(path) => path,
                Err(e) => {
                    self.fused = true;
                    return Some(Err(e));
                }
            };
            let mut entry = self.factory.entry_for_path(path);
            let outcome = entry.is_valid().and_then(|valid| {
                if !valid {
                    return Ok(None);
                }
                match entry.read_key() {
                    Ok(key) if key.starts_with(&self.prefix) => Ok(Some(key)),
                    Ok(_) => Ok(None),
                    Err(CacheError::Codec { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            });
            // Same policy as the point operations: the operation error
            // wins, a close failure alone still surfaces.
            let closed = entry.close();
            let outcome = outcome.and_then(|found| closed.map(|()| found));
            match outcome {
                Ok(Some(key)) => return Some(Ok(key)),
                Ok(None) => continue,
                Err(e) => {
                    self.fused = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileCacheConfig;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> FileCache {
        FileCache::new(FileCacheConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn bad_shard_geometry_is_rejected_at_construction() {
        let dir = TempDir::new().unwrap();
        let config = FileCacheConfig::builder(dir.path())
            .with_shard_geometry(5, 4)
            .build();
        let err = FileCache::new(config).unwrap_err();
        assert!(matches!(err, CacheError::Configuration { .. }));
    }

    #[test]
    fn temp_dir_is_invisible_to_bulk_operations() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.write("key", b"value", None, false).unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        std::fs::write(dir.path().join("tmp/stale-scratch"), b"junk").unwrap();

        let keys: Vec<_> = cache
            .list_keys("")
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(keys, vec!["key".to_string()]);

        cache.cleanup().unwrap();
        assert!(dir.path().join("tmp/stale-scratch").exists());
    }

    #[test]
    fn typed_round_trip_through_bincode() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Payload {
            name: String,
            hits: u64,
        }

        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let value = Payload {
            name: "example".to_string(),
            hits: 7,
        };
        cache.put("typed", &value, None, false).unwrap();
        assert_eq!(cache.get::<Payload>("typed").unwrap(), Some(value));
        assert_eq!(cache.get::<Payload>("missing").unwrap(), None);
    }
}
