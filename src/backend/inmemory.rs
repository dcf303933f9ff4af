//! In-memory cache backend.

use super::{CacheBackend, TtlUpdate};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>, now: Instant) -> Self {
        CacheEntry {
            value,
            expires_at: ttl.map(|d| now + d),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// Process-wide in-memory backend.
///
/// Entries live in a sharded `DashMap`; every per-key operation runs under
/// the key's shard lock. Expiry is passive: an expired entry reads as absent
/// and is removed when touched, or by [`InMemoryBackend::purge_expired`].
///
/// Expiry uses `tokio::time::Instant`, so paused-clock tests can advance it.
///
/// Cloning is cheap and clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the backend holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Remove every expired entry and return how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.store.len());
        if purged > 0 {
            debug!("✓ InMemory purged {} expired entries", purged);
        }
        purged
    }

    fn evict_if_expired(&self, key: &str, now: Instant) {
        if self
            .store
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            debug!("InMemory entry {} expired", key);
        }
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired(now) {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.value.clone()));
            }
        } else {
            debug!("✓ InMemory GET {} -> MISS", key);
            return Ok(None);
        }

        self.evict_if_expired(key, now);
        debug!("✓ InMemory GET {} -> EXPIRED", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(value, ttl, Instant::now());
        self.store.insert(key.to_string(), entry);

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .store
            .get(key)
            .map_or(false, |entry| !entry.is_expired(now)))
    }

    async fn update<F>(&self, key: &str, ttl: TtlUpdate, patch: F) -> Result<bool>
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>> + Send,
    {
        let now = Instant::now();
        match self.store.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                let value = patch(&entry.value)?;
                entry.value = value;
                if let TtlUpdate::Reset(ttl) = ttl {
                    entry.expires_at = ttl.map(|d| now + d);
                }
                debug!("✓ InMemory UPDATE {} ({:?})", key, ttl);
                Ok(true)
            }
            Some(entry) => {
                drop(entry);
                self.evict_if_expired(key, now);
                debug!("InMemory UPDATE {} skipped: expired", key);
                Ok(false)
            }
            None => {
                debug!("InMemory UPDATE {} skipped: absent", key);
                Ok(false)
            }
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn clear_all(&self) -> Result<()> {
        self.store.clear();
        warn!("⚠ InMemory cache cleared");
        Ok(())
    }
}
