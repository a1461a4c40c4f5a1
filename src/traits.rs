//! Backend capability interfaces
//!
//! The façade consumes backends through these traits and probes for the
//! optional capabilities at the type level: every backend stores, some
//! can filter and enumerate by key prefix, some can sweep stale entries.
//! Batch operations have provided looping implementations; a backend
//! with native multi-key support overrides them. The file engine does
//! not, so it gets the emulated loops.

use std::time::Duration;

use crate::driver::FileCache;
use crate::errors::{CacheError, Result};

/// Base capability: point reads and writes plus full clear.
pub trait Backend {
    fn exists(&self, key: &str) -> Result<bool>;

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn write(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Option<Duration>,
        overwrite: bool,
    ) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;

    /// Emulated batch read; one lookup per key.
    fn read_many(&self, keys: &[&str]) -> Result<Vec<(String, Option<Vec<u8>>)>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push((key.to_string(), self.read(key)?));
        }
        Ok(results)
    }

    /// Emulated batch write. With `overwrite` unset, keys that already
    /// hold valid entries are skipped rather than aborting the batch;
    /// the skipped keys are returned.
    fn write_many(
        &self,
        items: &[(&str, &[u8])],
        ttl: Option<Duration>,
        overwrite: bool,
    ) -> Result<Vec<String>> {
        let mut skipped = Vec::new();
        for (key, payload) in items {
            match self.write(key, payload, ttl, overwrite) {
                Ok(()) => {}
                Err(CacheError::AlreadyExists { .. }) => skipped.push(key.to_string()),
                Err(e) => return Err(e),
            }
        }
        Ok(skipped)
    }

    /// Emulated batch delete; one unlink per key.
    fn delete_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }
}

/// Optional capability: prefix deletion and key enumeration.
pub trait FilterableBackend: Backend {
    /// Delete every entry whose stored key starts with `prefix`; an
    /// empty prefix clears everything.
    fn filter(&self, prefix: &str) -> Result<()>;

    /// Stored keys of valid entries matching `prefix`, in unspecified
    /// order.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Optional capability: sweep of stale (invalid or expired) entries.
pub trait CleanupBackend: Backend {
    fn cleanup(&self) -> Result<()>;
}

impl Backend for FileCache {
    fn exists(&self, key: &str) -> Result<bool> {
        FileCache::exists(self, key)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        FileCache::read(self, key)
    }

    fn write(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Option<Duration>,
        overwrite: bool,
    ) -> Result<()> {
        FileCache::write(self, key, payload, ttl, overwrite)
    }

    fn delete(&self, key: &str) -> Result<()> {
        FileCache::delete(self, key)
    }

    fn clear(&self) -> Result<()> {
        FileCache::clear(self)
    }
}

impl FilterableBackend for FileCache {
    fn filter(&self, prefix: &str) -> Result<()> {
        FileCache::filter(self, prefix)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        FileCache::list_keys(self, prefix)?.collect()
    }
}

impl CleanupBackend for FileCache {
    fn cleanup(&self) -> Result<()> {
        FileCache::cleanup(self)
    }
}
