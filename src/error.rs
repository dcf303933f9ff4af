//! Error types for catalog and cache operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the cache, the repositories and the store.
///
/// A lookup that finds nothing is not an error: it surfaces as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A value could not be encoded for the cache or the store.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A cached or stored value could not be decoded.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Cache bytes did not carry a valid envelope.
    #[error("invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    /// Cache bytes were written by a different schema version.
    #[error("cache schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// A write's outcome is unknown because its task did not run to completion.
    #[error("repository error: {0}")]
    RepositoryError(String),

    /// The store could not be reached or could not complete the operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Input failed validation before reaching the store.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
