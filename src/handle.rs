//! File handle with explicit lifetime, cursor, and advisory lock state
//!
//! A [`Handle`] wraps exactly one open file descriptor together with the
//! path it was opened from and the advisory lock it currently holds. All
//! record I/O in this crate goes through fixed-width integers (8-byte
//! big-endian) and raw byte runs, so the on-disk layout is identical on
//! every platform.
//!
//! Dropping a handle releases any held lock; `close` does the same but
//! makes failures observable. Later operations by the same process must
//! never rely on drop-time release.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::errors::{CacheError, Result};

/// Width in bytes of every fixed integer in the on-disk formats.
pub const FIXED_INT_LEN: u64 = 8;

/// Advisory lock currently held by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Shared,
    Exclusive,
}

/// One open file descriptor, its path, and its lock state.
#[derive(Debug)]
pub struct Handle {
    file: File,
    path: PathBuf,
    lock: LockState,
}

impl Handle {
    /// Open an existing file read-only.
    pub fn open_read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| CacheError::io(&path, "open cache file", e))?;
        Ok(Self {
            file,
            path,
            lock: LockState::Unlocked,
        })
    }

    /// Open a file for reading and writing, creating it when `create` is
    /// set (the lock-based strategy's create-or-open mode).
    pub fn open_rw(path: impl Into<PathBuf>, create: bool) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&path)
            .map_err(|e| CacheError::io(&path, "open cache file read-write", e))?;
        Ok(Self {
            file,
            path,
            lock: LockState::Unlocked,
        })
    }

    /// Wrap an already open file (used for freshly created temp files).
    pub fn from_file(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
            lock: LockState::Unlocked,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> Result<u64> {
        let meta = self
            .file
            .metadata()
            .map_err(|e| CacheError::io(&self.path, "stat cache file", e))?;
        Ok(meta.len())
    }

    pub fn position(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|e| CacheError::io(&self.path, "query file position", e))
    }

    /// Bytes between the current position and end of file.
    pub fn remaining_bytes(&mut self) -> Result<u64> {
        let size = self.size()?;
        let pos = self.position()?;
        Ok(size.saturating_sub(pos))
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(pos))
            .map_err(|e| CacheError::io(&self.path, "seek", e))?;
        Ok(())
    }

    pub fn seek_relative(&mut self, offset: i64) -> Result<()> {
        self.file
            .seek(SeekFrom::Current(offset))
            .map_err(|e| CacheError::io(&self.path, "seek", e))?;
        Ok(())
    }

    /// Read one 8-byte big-endian integer at the current position.
    pub fn read_fixed_int(&mut self) -> Result<u64> {
        let mut buf = [0u8; FIXED_INT_LEN as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| CacheError::io(&self.path, "read fixed int", e))?;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn write_fixed_int(&mut self, value: u64) -> Result<()> {
        self.file
            .write_all(&value.to_be_bytes())
            .map_err(|e| CacheError::io(&self.path, "write fixed int", e))
    }

    pub fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| CacheError::io(&self.path, "read bytes", e))?;
        Ok(buf)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .write_all(bytes)
            .map_err(|e| CacheError::io(&self.path, "write bytes", e))
    }

    /// Read a UTF-8 string of `len` bytes, or everything up to end of
    /// file when `len` is `None`.
    pub fn read_string(&mut self, len: Option<usize>) -> Result<String> {
        let bytes = match len {
            Some(len) => self.read_exact_bytes(len)?,
            None => {
                let mut buf = Vec::new();
                self.file
                    .read_to_end(&mut buf)
                    .map_err(|e| CacheError::io(&self.path, "read to end of file", e))?;
                buf
            }
        };
        String::from_utf8(bytes)
            .map_err(|_| CacheError::codec(&self.path, "stored string is not valid UTF-8"))
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Shrink or extend the file to `len` bytes. The cursor is moved back
    /// to `len` if it would otherwise point past the new end.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .map_err(|e| CacheError::io(&self.path, "truncate", e))?;
        if self.position()? > len {
            self.seek(len)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| CacheError::io(&self.path, "flush", e))
    }

    /// Acquire (or upgrade to) an advisory lock. Returns `false` when a
    /// non-blocking attempt lost against a conflicting holder; a blocking
    /// attempt only returns once the lock is held.
    pub fn lock(&mut self, exclusive: bool, blocking: bool) -> Result<bool> {
        // Fully qualified: std::fs::File has grown inherent lock methods
        // with different signatures that would otherwise shadow fs2's.
        let outcome = match (exclusive, blocking) {
            (true, true) => FileExt::lock_exclusive(&self.file),
            (true, false) => FileExt::try_lock_exclusive(&self.file),
            (false, true) => FileExt::lock_shared(&self.file),
            (false, false) => FileExt::try_lock_shared(&self.file),
        };
        match outcome {
            Ok(()) => {
                self.lock = if exclusive {
                    LockState::Exclusive
                } else {
                    LockState::Shared
                };
                Ok(true)
            }
            Err(e) if !blocking && e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(CacheError::io(&self.path, "acquire advisory lock", e)),
        }
    }

    /// Release the held lock. Returns `false` when no lock was held.
    pub fn unlock(&mut self) -> Result<bool> {
        if self.lock == LockState::Unlocked {
            return Ok(false);
        }
        fs2::FileExt::unlock(&self.file)
            .map_err(|e| CacheError::io(&self.path, "release advisory lock", e))?;
        self.lock = LockState::Unlocked;
        Ok(true)
    }

    pub fn is_locked(&self) -> bool {
        self.lock != LockState::Unlocked
    }

    pub fn has_exclusive_lock(&self) -> bool {
        self.lock == LockState::Exclusive
    }

    /// Release any held lock and close the descriptor.
    pub fn close(mut self) -> Result<()> {
        self.unlock()?;
        // Dropping self closes the descriptor.
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.lock != LockState::Unlocked {
            let _ = fs2::FileExt::unlock(&self.file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn handle_in(dir: &TempDir, name: &str) -> Handle {
        Handle::open_rw(dir.path().join(name), true).unwrap()
    }

    #[test]
    fn fixed_int_round_trip_is_big_endian() {
        let dir = TempDir::new().unwrap();
        let mut h = handle_in(&dir, "ints");
        h.write_fixed_int(0x0102_0304_0506_0708).unwrap();
        h.seek(0).unwrap();
        assert_eq!(h.read_fixed_int().unwrap(), 0x0102_0304_0506_0708);

        let raw = std::fs::read(dir.path().join("ints")).unwrap();
        assert_eq!(raw, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn read_string_without_length_reads_to_eof() {
        let dir = TempDir::new().unwrap();
        let mut h = handle_in(&dir, "str");
        h.write_fixed_int(7).unwrap();
        h.write_string("hello world").unwrap();
        h.seek(FIXED_INT_LEN).unwrap();
        assert_eq!(h.read_string(None).unwrap(), "hello world");
        assert_eq!(h.remaining_bytes().unwrap(), 0);
    }

    #[test]
    fn truncate_moves_cursor_back_inside_file() {
        let dir = TempDir::new().unwrap();
        let mut h = handle_in(&dir, "trunc");
        h.write_bytes(b"0123456789").unwrap();
        h.truncate(0).unwrap();
        assert_eq!(h.position().unwrap(), 0);
        assert_eq!(h.size().unwrap(), 0);
    }

    #[test]
    fn lock_state_tracks_upgrade_and_release() {
        let dir = TempDir::new().unwrap();
        let mut h = handle_in(&dir, "lock");
        assert!(!h.is_locked());

        assert!(h.lock(false, true).unwrap());
        assert!(h.is_locked());
        assert!(!h.has_exclusive_lock());

        // Upgrade on the same descriptor: no conflicting holder exists.
        assert!(h.lock(true, false).unwrap());
        assert!(h.has_exclusive_lock());

        assert!(h.unlock().unwrap());
        assert!(!h.is_locked());
        assert!(!h.unlock().unwrap());
    }

    #[test]
    fn contended_try_lock_returns_false() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contended");
        let mut a = Handle::open_rw(&path, true).unwrap();
        let mut b = Handle::open_rw(&path, true).unwrap();

        assert!(a.lock(false, true).unwrap());
        // Shared + shared is fine, shared + exclusive is not.
        assert!(b.lock(false, false).unwrap());
        assert!(b.unlock().unwrap());
        assert!(!b.lock(true, false).unwrap());
        assert!(!b.is_locked());
    }

    #[test]
    fn missing_file_is_a_not_found_error() {
        let dir = TempDir::new().unwrap();
        let err = Handle::open_read(dir.path().join("absent")).unwrap_err();
        assert!(err.is_not_found());
    }
}
