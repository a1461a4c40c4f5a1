//! Self-guarding record layout
//!
//! The file opens with a literal PHP preamble that sends an error status
//! and halts compilation. If the cache directory is ever exposed under a
//! web root that executes `.php` files, requesting a cache file runs the
//! preamble and emits nothing of the stored payload.
//!
//! ```text
//! [preamble][payload bytes][u64 expiration][key bytes][u64 footer_pos]
//! ```
//!
//! `footer_pos` is the offset of the expiration field and is stored as
//! the very last fixed int, so the footer is located by seeking to
//! `size - 8` and following one indirection. The payload sits between
//! the preamble and the footer as raw bytes; nothing in the read path
//! ever evaluates it.

use super::{Expiration, FormatCodec};
use crate::errors::{CacheError, Result};
use crate::handle::{Handle, FIXED_INT_LEN};

/// Literal script preamble written at the start of every guarded file.
pub const GUARD_PREAMBLE: &[u8] = b"<?php http_response_code(403); exit; __halt_compiler();";

/// Footer fields surrounding the key: expiration and footer position.
const FOOTER_FIXED_LEN: u64 = 2 * FIXED_INT_LEN;

#[derive(Debug, Clone, Copy, Default)]
pub struct GuardedCodec;

impl GuardedCodec {
    fn min_size() -> u64 {
        GUARD_PREAMBLE.len() as u64 + FOOTER_FIXED_LEN
    }

    /// Locate the footer via the trailing fixed int and return its
    /// offset, leaving the handle positioned at the expiration field.
    fn seek_to_footer(&self, handle: &mut Handle) -> Result<u64> {
        let size = handle.size()?;
        if size < Self::min_size() {
            return Err(CacheError::codec(
                handle.path(),
                format!("{size}-byte file is smaller than the guarded minimum"),
            ));
        }
        handle.seek(size - FIXED_INT_LEN)?;
        let footer_pos = handle.read_fixed_int()?;
        if !Self::footer_in_bounds(footer_pos, size) {
            return Err(CacheError::codec(
                handle.path(),
                format!("footer position {footer_pos} out of bounds for {size}-byte file"),
            ));
        }
        handle.seek(footer_pos)?;
        Ok(footer_pos)
    }

    /// Bounds check on an untrusted footer position; a value near
    /// `u64::MAX` must not wrap past the file size.
    fn footer_in_bounds(footer_pos: u64, size: u64) -> bool {
        footer_pos >= GUARD_PREAMBLE.len() as u64
            && footer_pos
                .checked_add(FOOTER_FIXED_LEN)
                .is_some_and(|end| end <= size)
    }
}

impl FormatCodec for GuardedCodec {
    fn validate(&self, handle: &mut Handle) -> Result<bool> {
        let size = handle.size()?;
        if size < Self::min_size() {
            return Ok(false);
        }
        handle.seek(size - FIXED_INT_LEN)?;
        let footer_pos = handle.read_fixed_int()?;
        Ok(Self::footer_in_bounds(footer_pos, size))
    }

    fn read_expiration(&self, handle: &mut Handle) -> Result<Expiration> {
        self.seek_to_footer(handle)?;
        Ok(Expiration::at(handle.read_fixed_int()?))
    }

    fn read_key(&self, handle: &mut Handle) -> Result<String> {
        let size = handle.size()?;
        let footer_pos = self.seek_to_footer(handle)?;
        handle.seek_relative(FIXED_INT_LEN as i64)?;
        let key_len = size - footer_pos - FOOTER_FIXED_LEN;
        handle.read_string(Some(key_len as usize))
    }

    fn read_data(&self, handle: &mut Handle) -> Result<Vec<u8>> {
        let footer_pos = self.seek_to_footer(handle)?;
        handle.seek(GUARD_PREAMBLE.len() as u64)?;
        let payload_len = footer_pos - GUARD_PREAMBLE.len() as u64;
        handle.read_exact_bytes(payload_len as usize)
    }

    fn write(
        &self,
        handle: &mut Handle,
        key: &str,
        payload: &[u8],
        expires: Expiration,
    ) -> Result<()> {
        let footer_pos = (GUARD_PREAMBLE.len() + payload.len()) as u64;
        handle.write_bytes(GUARD_PREAMBLE)?;
        handle.write_bytes(payload)?;
        handle.write_fixed_int(expires.timestamp())?;
        handle.write_string(key)?;
        handle.write_fixed_int(footer_pos)?;
        handle.flush()
    }

    fn filename_suffix(&self) -> &'static str {
        ".php"
    }
}
