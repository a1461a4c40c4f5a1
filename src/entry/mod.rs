//! Durable entry for one cached key
//!
//! An entry binds a format codec to one resolved path and exposes the
//! strategy-agnostic capability set the driver works against: validate,
//! read key, read payload, write, delete, close. The two concurrency
//! strategies live in [`atomic`] and [`locked`]; the [`factory`] wires
//! codec, resolver, and strategy configuration together.
//!
//! Entries are created per logical operation (or per discovered file
//! during a tree walk), hold at most one lazily opened read handle that
//! is rewound on reuse, and carry no identity beyond their bound path.

mod atomic;
mod factory;
mod locked;

pub use atomic::AtomicEntry;
pub use factory::{EntryFactory, WriteStrategy};
pub use locked::LockedEntry;

use std::fs;
use std::path::Path;

use crate::codec::Expiration;
use crate::errors::{CacheError, Result};

/// Capability set every write strategy satisfies.
pub trait StoreEntry {
    /// The path this entry is bound to.
    fn path(&self) -> &Path;

    /// Codec validation composed with the expiration check. Missing,
    /// structurally invalid, and expired files are all `false`.
    fn is_valid(&mut self) -> Result<bool>;

    /// Recover the logical key stored inside the file.
    fn read_key(&mut self) -> Result<String>;

    /// Read the stored payload.
    fn read_data(&mut self) -> Result<Vec<u8>>;

    /// Install a full new record. With `overwrite` unset an existing
    /// valid entry fails with [`CacheError::AlreadyExists`] and the file
    /// is left untouched.
    fn write(
        &mut self,
        key: &str,
        payload: &[u8],
        expires: Expiration,
        overwrite: bool,
    ) -> Result<()>;

    /// Remove the entry from disk. Missing files are not an error.
    fn delete(&mut self) -> Result<()>;

    /// Release the cached handle and any lock it holds.
    fn close(&mut self) -> Result<()>;
}

/// Create the missing ancestors of `path`, applying `dir_mode` to each
/// directory this call actually created.
pub(crate) fn create_parent_dirs(path: &Path, dir_mode: Option<u32>) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    let mut missing = Vec::new();
    let mut cursor = parent;
    while !cursor.exists() {
        missing.push(cursor.to_path_buf());
        match cursor.parent() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    for dir in missing.iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => apply_dir_mode(dir, dir_mode)?,
            // Lost a creation race with another process.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(CacheError::io(dir, "create shard directory", e)),
        }
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn apply_dir_mode(dir: &Path, dir_mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = dir_mode {
        fs::set_permissions(dir, fs::Permissions::from_mode(mode))
            .map_err(|e| CacheError::io(dir, "set directory permissions", e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn apply_dir_mode(_dir: &Path, _dir_mode: Option<u32>) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
pub(crate) fn apply_file_mode(path: &Path, file_mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = file_mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| CacheError::io(path, "set file permissions", e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn apply_file_mode(_path: &Path, _file_mode: Option<u32>) -> Result<()> {
    Ok(())
}
