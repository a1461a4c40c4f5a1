//! File-backed cache storage engine
//!
//! This crate turns a logical key into a durable, concurrently-safe,
//! self-describing file on a local filesystem:
//! - Deterministic key-to-path sharding to bound per-directory entry
//!   counts
//! - Two on-disk formats: a dense binary layout and a self-guarding
//!   layout safe to leave under a web root
//! - Two write strategies: atomic temp-file-plus-rename, and in-place
//!   writes under advisory locks with shared-to-exclusive upgrade
//! - Expiration, stale-entry cleanup, prefix filtering, and key
//!   enumeration over the whole tree
//!
//! [`FileCache`] is the engine; the [`traits`] module defines the
//! capability surface a façade dispatches against.

pub mod codec;
pub mod config;
pub mod driver;
pub mod entry;
pub mod errors;
pub mod handle;
pub mod resolve;
pub mod traits;
pub mod walk;

pub use codec::{BinaryCodec, CodecKind, Expiration, FormatCodec, GuardedCodec};
pub use config::{FileCacheConfig, FileCacheConfigBuilder};
pub use driver::{FileCache, KeyIter};
pub use entry::{EntryFactory, StoreEntry, WriteStrategy};
pub use errors::{CacheError, RecoveryHint, Result};
pub use handle::{Handle, LockState};
pub use resolve::{HashAlgorithm, PathResolver};
pub use traits::{Backend, CleanupBackend, FilterableBackend};
