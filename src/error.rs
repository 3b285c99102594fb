//! Error types for kdbtree
//!
//! Every backend operation reports one of these kinds to its caller.

use thiserror::Error;

/// Result type alias using KdbError
pub type Result<T> = std::result::Result<T, KdbError>;

/// Unified error type for kdbtree operations
#[derive(Debug, Error)]
pub enum KdbError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Directory key not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid key name: {0:?}")]
    InvalidName(String),

    // -------------------------------------------------------------------------
    // Domain / Storage Errors
    // -------------------------------------------------------------------------
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Domain unreachable: {0}")]
    Unreachable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Out of memory")]
    OutOfMemory,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Wrap an engine failure, logging it where it was detected.
///
/// Used as `.map_err(engine_error("open keyvalue table"))`.
pub(crate) fn engine_error<E>(context: &'static str) -> impl FnOnce(E) -> KdbError
where
    E: Into<redb::Error>,
{
    move |err| {
        let err: redb::Error = err.into();
        tracing::error!("engine failure during {}: {}", context, err);
        KdbError::BackendUnavailable(format!("{}: {}", context, err))
    }
}
