//! Rename-based entry strategy
//!
//! Writes serialize the full record into a fresh temp file and install
//! it over the target path with a single rename, so readers only ever
//! observe the fully-old or fully-new file. If the rename fails the temp
//! file is removed and the previous target is untouched.
//!
//! The guarantee rests on the target filesystem's rename being atomic.
//! On platforms where open handles can block or invalidate the rename
//! this strategy is unsafe for cross-process use; use [`LockedEntry`]
//! there instead.
//!
//! [`LockedEntry`]: super::LockedEntry

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use super::{apply_file_mode, create_parent_dirs, StoreEntry};
use crate::codec::{Expiration, FormatCodec};
use crate::errors::{CacheError, RecoveryHint, Result};
use crate::handle::Handle;

pub struct AtomicEntry {
    codec: Arc<dyn FormatCodec>,
    path: PathBuf,
    temp_dir: PathBuf,
    file_mode: Option<u32>,
    dir_mode: Option<u32>,
    read_handle: Option<Handle>,
}

impl AtomicEntry {
    pub fn new(
        codec: Arc<dyn FormatCodec>,
        path: PathBuf,
        temp_dir: PathBuf,
        file_mode: Option<u32>,
        dir_mode: Option<u32>,
    ) -> Self {
        Self {
            codec,
            path,
            temp_dir,
            file_mode,
            dir_mode,
            read_handle: None,
        }
    }

    /// Open the cached read handle, or rewind it when it already exists.
    /// `None` means the file is missing.
    fn reader(&mut self) -> Result<Option<&mut Handle>> {
        if self.read_handle.is_none() {
            match Handle::open_read(&self.path) {
                Ok(handle) => self.read_handle = Some(handle),
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        let handle = self.read_handle.as_mut().unwrap();
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
}

impl StoreEntry for AtomicEntry {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_valid(&mut self) -> Result<bool> {
        let codec = Arc::clone(&self.codec);
        let Some(handle) = self.reader()? else {
            return Ok(false);
        };
        if !codec.validate(handle)? {
            return Ok(false);
        }
        handle.seek(0)?;
        let expires = codec.read_expiration(handle)?;
        Ok(!expires.is_expired())
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
        if !overwrite && self.is_valid()? {
            return Err(CacheError::AlreadyExists {
                path: self.path.clone(),
                recovery_hint: RecoveryHint::Ignore,
            });
        }
        // The cached handle points at the file being replaced.
        self.close()?;

        fs::create_dir_all(&self.temp_dir)
            .map_err(|e| CacheError::io(&self.temp_dir, "create temp directory", e))?;
        let temp = NamedTempFile::new_in(&self.temp_dir)
            .map_err(|e| CacheError::io(&self.temp_dir, "create temp file", e))?;
        let (file, temp_path) = temp.into_parts();

        let mut handle = Handle::from_file(file, temp_path.to_path_buf());
        self.codec.write(&mut handle, key, payload, expires)?;
        handle.close()?;
        apply_file_mode(&temp_path, self.file_mode)?;

        create_parent_dirs(&self.path, self.dir_mode)?;
        // Dropping the TempPath inside the error removes the temp file.
        temp_path
            .persist(&self.path)
            .map_err(|e| CacheError::io(&self.path, "atomic rename", e.error))?;

        tracing::debug!(path = %self.path.display(), "installed cache entry");
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        self.close()?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.path, "unlink cache file", e)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.read_handle.take() {
            handle.close()?;
        }
        Ok(())
    }
}

impl Drop for AtomicEntry {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
