//! Advisory-lock entry strategy
//!
//! Writes happen in place on a create-or-open read/write handle, guarded
//! by OS advisory locks: shared for reads and for the overwrite
//! precondition check, exclusive for the truncate-and-write itself. The
//! shared-to-exclusive upgrade is a non-blocking attempt; losing it to a
//! conflicting holder fails the write with a distinct error instead of
//! silently downgrading safety. Upgrade starvation under heavy read
//! contention is an accepted trade-off of this strategy.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{apply_file_mode, create_parent_dirs, StoreEntry};
use crate::codec::{Expiration, FormatCodec};
use crate::errors::{CacheError, RecoveryHint, Result};
use crate::handle::Handle;

pub struct LockedEntry {
    codec: Arc<dyn FormatCodec>,
    path: PathBuf,
    file_mode: Option<u32>,
    dir_mode: Option<u32>,
    handle: Option<Handle>,
    writable: bool,
}

impl LockedEntry {
    pub fn new(
        codec: Arc<dyn FormatCodec>,
        path: PathBuf,
        file_mode: Option<u32>,
        dir_mode: Option<u32>,
    ) -> Self {
        Self {
            codec,
            path,
            file_mode,
            dir_mode,
            handle: None,
            writable: false,
        }
    }

    /// Open or rewind the cached handle under a shared lock. `None`
    /// means the file is missing; reads never create it.
    fn reader(&mut self) -> Result<Option<&mut Handle>> {
        if self.handle.is_none() {
            match Handle::open_read(&self.path) {
                Ok(handle) => {
                    self.handle = Some(handle);
                    self.writable = false;
                }
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        let handle = self.handle.as_mut().unwrap();
        if !handle.is_locked() {
            handle.lock(false, true)?;
        }
        handle.seek(0)?;
        Ok(Some(handle))
    }

    fn require_reader(&mut self) -> Result<&mut Handle> {
        let path = self.path.clone();
        match self.reader()? {
            Some(handle) => Ok(handle),
            None => Err(CacheError::io(
                path,
                "open cache file",
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )),
        }
    }

    /// Open or reuse the handle in create-or-open read/write mode. A
    /// cached read-only handle is replaced; its shared lock is released
    /// with it.
    fn writer(&mut self) -> Result<&mut Handle> {
        if self.handle.is_some() && !self.writable {
            self.close()?;
        }
        if self.handle.is_none() {
            create_parent_dirs(&self.path, self.dir_mode)?;
            let existed = self.path.exists();
            let handle = Handle::open_rw(&self.path, true)?;
            if !existed {
                apply_file_mode(&self.path, self.file_mode)?;
            }
            self.handle = Some(handle);
            self.writable = true;
        }
        let handle = self.handle.as_mut().unwrap();
        handle.seek(0)?;
        Ok(handle)
    }

    /// Codec validation plus expiration check on an already positioned
    /// and locked handle.
    fn check_valid(codec: &dyn FormatCodec, handle: &mut Handle) -> Result<bool> {
        if !codec.validate(handle)? {
            return Ok(false);
        }
        handle.seek(0)?;
        let expires = codec.read_expiration(handle)?;
        Ok(!expires.is_expired())
    }
}

impl StoreEntry for LockedEntry {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_valid(&mut self) -> Result<bool> {
        let codec = Arc::clone(&self.codec);
        let Some(handle) = self.reader()? else {
            return Ok(false);
        };
        Self::check_valid(codec.as_ref(), handle)
    }

    fn read_key(&mut self) -> Result<String> {
        let codec = Arc::clone(&self.codec);
        let handle = self.require_reader()?;
        codec.read_key(handle)
    }

    fn read_data(&mut self) -> Result<Vec<u8>> {
        let codec = Arc::clone(&self.codec);
        let handle = self.require_reader()?;
        codec.read_data(handle)
    }

    fn write(
        &mut self,
        key: &str,
        payload: &[u8],
        expires: Expiration,
        overwrite: bool,
    ) -> Result<()> {
        let codec = Arc::clone(&self.codec);
        let path = self.path.clone();
        let handle = self.writer()?;

        if overwrite {
            handle.lock(true, true)?;
        } else {
            // Shared first: the validity check may run concurrently with
            // other readers.
            handle.lock(false, true)?;
            if Self::check_valid(codec.as_ref(), handle)? {
                handle.unlock()?;
                return Err(CacheError::AlreadyExists {
                    path,
                    recovery_hint: RecoveryHint::Ignore,
                });
            }
            if !handle.lock(true, false)? {
                return Err(CacheError::LockUpgrade {
                    path,
                    recovery_hint: RecoveryHint::Retry {
                        after: std::time::Duration::from_millis(10),
                    },
                });
            }
        }

        handle.truncate(0)?;
        handle.seek(0)?;
        codec.write(handle, key, payload, expires)?;

        tracing::debug!(path = %self.path.display(), "wrote cache entry in place");
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        self.close()?;
        match fs::remove_file(&self.path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %e,
                    "unlink failed, falling back to soft delete"
                );
            }
        }

        // Soft delete: an empty file fails codec validation, so future
        // reads treat the entry as absent.
        let mut handle = match Handle::open_rw(&self.path, false) {
            Ok(handle) => handle,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        handle.lock(true, true)?;
        handle.truncate(0)?;
        handle.close()
    }

    fn close(&mut self) -> Result<()> {
        self.writable = false;
        if let Some(handle) = self.handle.take() {
            handle.close()?;
        }
        Ok(())
    }
}

impl Drop for LockedEntry {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
