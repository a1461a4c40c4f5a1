//! On-disk format codecs
//!
//! A codec is a stateless byte-layout contract: it validates a handle's
//! structural minimum, extracts expiration/key/payload from a handle
//! positioned at the start of a record, and serializes a full record.
//! Callers must reposition the handle before every read; the codec never
//! rewinds on its own.

mod binary;
mod guarded;

pub use binary::BinaryCodec;
pub use guarded::{GuardedCodec, GUARD_PREAMBLE};

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::errors::Result;
use crate::handle::Handle;

/// Absolute expiration instant in Unix seconds. Zero is the reserved
/// "never expires" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration(u64);

impl Expiration {
    pub const NEVER: Expiration = Expiration(0);

    /// Expire at an absolute Unix timestamp.
    pub fn at(timestamp: u64) -> Self {
        Expiration(timestamp)
    }

    /// Expire `ttl` from now; `None` or a zero duration means never.
    pub fn from_ttl(ttl: Option<Duration>) -> Self {
        match ttl {
            None => Expiration::NEVER,
            Some(ttl) if ttl.is_zero() => Expiration::NEVER,
            // Saturate: a TTL past the end of u64 seconds stays a far
            // future instant instead of wrapping into the past.
            Some(ttl) => Expiration(unix_now().saturating_add(ttl.as_secs())),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.0
    }

    /// The boundary is inclusive: an entry is expired at exactly its
    /// expiration instant.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.0 != 0 && now >= self.0
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

/// Current time in Unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Byte-layout contract for one cache record.
///
/// Every read method assumes the handle is positioned at the start of the
/// record and leaves the position wherever the read ended.
pub trait FormatCodec: Send + Sync {
    /// Cheap structural minimum check only; no deserialization.
    fn validate(&self, handle: &mut Handle) -> Result<bool>;

    fn read_expiration(&self, handle: &mut Handle) -> Result<Expiration>;

    fn read_key(&self, handle: &mut Handle) -> Result<String>;

    fn read_data(&self, handle: &mut Handle) -> Result<Vec<u8>>;

    fn write(
        &self,
        handle: &mut Handle,
        key: &str,
        payload: &[u8],
        expires: Expiration,
    ) -> Result<()>;

    /// Filename suffix for files written in this format, including the dot.
    fn filename_suffix(&self) -> &'static str;
}

/// Codec selection for the driver configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// Dense binary layout, `.dat` files.
    #[default]
    Binary,
    /// Self-guarding layout with a script preamble, `.php` files.
    Guarded,
}

impl CodecKind {
    pub fn codec(&self) -> Arc<dyn FormatCodec> {
        match self {
            CodecKind::Binary => Arc::new(BinaryCodec),
            CodecKind::Guarded => Arc::new(GuardedCodec),
        }
    }
}
