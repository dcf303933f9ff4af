//! Cache backend abstraction.
//!
//! A backend is a shared key-value store of opaque bytes with per-entry
//! expiration. Every operation on a single key is atomic with respect to
//! other operations on that key.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "inmemory")]
mod inmemory;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBackend;

/// What happens to an entry's expiry when it is patched in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlUpdate {
    /// Keep the entry's current expiry.
    Preserve,
    /// Restart the expiry clock with this TTL (`None` = never expires).
    Reset(Option<Duration>),
}

/// Storage backend used by the cache coordinator.
pub trait CacheBackend: Clone + Send + Sync + 'static {
    /// Read an entry. Expired entries read as `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Write an entry, replacing any previous value. `ttl = None` never expires.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove an entry. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether an unexpired entry exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Patch an entry in place as one atomic step.
    ///
    /// If the entry is present and unexpired, `patch` receives its bytes and
    /// returns the replacement. Returns `Ok(false)` without calling `patch`
    /// when the entry is absent. If `patch` fails the entry is left untouched
    /// and the error is returned.
    fn update<F>(
        &self,
        key: &str,
        ttl: TtlUpdate,
        patch: F,
    ) -> impl Future<Output = Result<bool>> + Send
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>> + Send;

    /// Check that the backend is able to serve requests.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Drop every entry.
    fn clear_all(&self) -> impl Future<Output = Result<()>> + Send;
}
