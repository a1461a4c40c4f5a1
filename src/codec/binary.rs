//! Dense binary record layout
//!
//! ```text
//! [u64 expiration][u64 payload_len][payload bytes][key bytes to EOF]
//! ```
//!
//! The key is stored after the payload, so recovering it means reading
//! through the payload length first. Key-only scans therefore cost
//! proportionally to file size; keys are only ever enumerated as part of
//! a full tree scan, so the asymmetry is accepted.

use super::{Expiration, FormatCodec};
use crate::errors::{CacheError, Result};
use crate::handle::{Handle, FIXED_INT_LEN};

/// The two leading fixed ints every record must at least contain.
const MIN_RECORD_LEN: u64 = 2 * FIXED_INT_LEN;

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Skip the expiration field and return the payload length, leaving
    /// the handle positioned at the first payload byte.
    fn seek_past_header(&self, handle: &mut Handle) -> Result<u64> {
        handle.seek_relative(FIXED_INT_LEN as i64)?;
        let payload_len = handle.read_fixed_int()?;
        if payload_len > handle.remaining_bytes()? {
            return Err(CacheError::codec(
                handle.path(),
                format!("payload length {payload_len} exceeds file size"),
            ));
        }
        Ok(payload_len)
    }
}

impl FormatCodec for BinaryCodec {
    fn validate(&self, handle: &mut Handle) -> Result<bool> {
        Ok(handle.remaining_bytes()? >= MIN_RECORD_LEN)
    }

    fn read_expiration(&self, handle: &mut Handle) -> Result<Expiration> {
        Ok(Expiration::at(handle.read_fixed_int()?))
    }

    fn read_key(&self, handle: &mut Handle) -> Result<String> {
        let payload_len = self.seek_past_header(handle)?;
        handle.seek_relative(payload_len as i64)?;
        handle.read_string(None)
    }

    fn read_data(&self, handle: &mut Handle) -> Result<Vec<u8>> {
        let payload_len = self.seek_past_header(handle)?;
        handle.read_exact_bytes(payload_len as usize)
    }

    fn write(
        &self,
        handle: &mut Handle,
        key: &str,
        payload: &[u8],
        expires: Expiration,
    ) -> Result<()> {
        handle.write_fixed_int(expires.timestamp())?;
        handle.write_fixed_int(payload.len() as u64)?;
        handle.write_bytes(payload)?;
        handle.write_string(key)?;
        handle.flush()
    }

    fn filename_suffix(&self) -> &'static str {
        ".dat"
    }
}
