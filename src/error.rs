//! Errors
//!
//! TigerStyle: one error type per boundary, constructor helpers per variant.
//!
//! None of these ever reach the caller of [`crate::StorageManager`]; they
//! surface from providers and config loading and are logged where caught.

use thiserror::Error;

/// Result alias for provider operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage providers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unreachable or rejected the connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// Backend kind not compiled into this build.
    #[error("unsupported backend: {0}")]
    Unsupported(String),

    /// Schema, table or index preparation failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// A single write failed.
    #[error("write error: {0}")]
    Write(String),

    /// Payload could not be encoded for the backend.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else (closed provider, injected fault).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Backend unreachable or misconfigured.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Backend not available in this build.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Preparation failure.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Write failure.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Internal failure.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the backend could not be reached at all.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Unsupported(_))
    }
}

/// Errors raised while loading configuration or catalog files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// File is not valid JSON for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Offending path.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },
}
