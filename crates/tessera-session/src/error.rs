//! Error types for session operations.

use std::time::Duration;

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No backend is registered under the requested name.
    #[error("Unknown session backend: {0}")]
    UnknownBackend(String),

    /// The storage backend failed (connection refused, protocol error, ...).
    #[error("Backend error: {0}")]
    Backend(String),

    /// A remote call did not complete within its bound.
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    /// A session record could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
