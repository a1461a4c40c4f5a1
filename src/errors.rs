//! Error types for the file cache engine
//!
//! Every failure carries the path it happened on and the operation that
//! failed, plus a recovery hint for operational tooling. Absence of an
//! entry (missing, structurally invalid, or expired) is never an error;
//! it is reported as `Ok(false)` / `Ok(None)` by the callers.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error type for cache operations
#[derive(Debug)]
pub enum CacheError {
    /// An OS-level call failed (open/seek/read/write/lock/rename/unlink)
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// Write without overwrite hit an existing valid entry
    AlreadyExists {
        path: PathBuf,
        recovery_hint: RecoveryHint,
    },

    /// Shared-to-exclusive lock upgrade lost against a concurrent holder
    LockUpgrade {
        path: PathBuf,
        recovery_hint: RecoveryHint,
    },

    /// A structurally valid file could not be materialized into a value
    Codec {
        path: PathBuf,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// Typed payload encode/decode failed
    Serialization {
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery_hint: RecoveryHint,
    },

    /// Caller configuration mistake, rejected eagerly at construction
    Configuration {
        message: String,
        recovery_hint: RecoveryHint,
    },
}

/// Recovery hints for error handling
#[derive(Debug, Clone)]
pub enum RecoveryHint {
    /// Retry the operation after a delay
    Retry { after: Duration },

    /// Clear the affected entry and retry
    ClearAndRetry,

    /// Check file permissions
    CheckPermissions { path: PathBuf },

    /// No automated recovery possible
    Manual { instructions: String },

    /// Operation can be safely ignored
    Ignore,
}

impl CacheError {
    /// Wrap an OS error with path and operation context, deriving a hint
    /// from the error kind.
    pub(crate) fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        let path = path.into();
        let recovery_hint = if source.kind() == std::io::ErrorKind::PermissionDenied {
            RecoveryHint::CheckPermissions { path: path.clone() }
        } else {
            RecoveryHint::Retry {
                after: Duration::from_millis(10),
            }
        };
        CacheError::Io {
            path,
            operation,
            source,
            recovery_hint,
        }
    }

    pub(crate) fn codec(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CacheError::Codec {
            path: path.into(),
            reason: reason.into(),
            recovery_hint: RecoveryHint::ClearAndRetry,
        }
    }

    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CacheError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io {
                path,
                operation,
                source,
                ..
            } => write!(
                f,
                "I/O error during {} on '{}': {}",
                operation,
                path.display(),
                source
            ),
            Self::AlreadyExists { path, .. } => write!(
                f,
                "cache entry at '{}' already exists and overwrite was not requested",
                path.display()
            ),
            Self::LockUpgrade { path, .. } => write!(
                f,
                "failed to upgrade shared lock to exclusive on '{}'",
                path.display()
            ),
            Self::Codec { path, reason, .. } => {
                write!(f, "codec read failed on '{}': {}", path.display(), reason)
            }
            Self::Serialization { key, source, .. } => {
                write!(f, "failed to serialize cache entry '{key}': {source}")
            }
            Self::Configuration { message, .. } => {
                write!(f, "cache configuration error: {message}")
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialization { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
