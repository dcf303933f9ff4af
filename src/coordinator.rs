//! Cache coordinator - keeps the single-item and whole-collection cache
//! entries coherent with each other and with the repository.
//!
//! Reads are read-through: a miss loads from the repository and stores the
//! result with a fresh TTL. A lookup that finds nothing caches the absence.
//!
//! Writes are write-through: after the repository accepts a write, the item
//! entry is set (or removed) and, if the collection entry is cached, the
//! affected element is patched in place. An uncached collection is never
//! reloaded eagerly; its next read-through load already reflects the write.
//! A failed repository call leaves both cache shapes untouched.

use crate::backend::{CacheBackend, TtlUpdate};
use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use crate::gate::KeyGates;
use crate::key::CacheKeyBuilder;
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::repository::DataRepository;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Coordinates one entity kind's repository with the shared cache backend.
///
/// # Example
///
/// ```ignore
/// use catalog_cache::{backend::InMemoryBackend, repository::InMemoryRepository};
///
/// let backend = InMemoryBackend::new();
/// let books = CacheCoordinator::new(InMemoryRepository::<Book>::new(), backend.clone());
///
/// books.upsert(dune).await?;
/// let dune = books.get_by_key(&"Dune".to_string()).await?;
/// ```
pub struct CacheCoordinator<T, R, B>
where
    T: CacheEntity,
    R: DataRepository<T>,
    B: CacheBackend,
{
    repository: Arc<R>,
    backend: B,
    metrics: Arc<dyn CacheMetrics>,
    ttl_policy: TtlPolicy,
    gates: Arc<KeyGates>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, R, B> CacheCoordinator<T, R, B>
where
    T: CacheEntity,
    R: DataRepository<T>,
    B: CacheBackend,
{
    /// Create a coordinator over `repository`, caching into `backend`.
    pub fn new(repository: R, backend: B) -> Self {
        CacheCoordinator {
            repository: Arc::new(repository),
            backend,
            metrics: Arc::new(NoOpMetrics),
            ttl_policy: TtlPolicy::default(),
            gates: Arc::new(KeyGates::new()),
            _entity: PhantomData,
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set custom TTL policy.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    /// All entities of this kind.
    ///
    /// Served from the collection entry when cached; otherwise loaded from
    /// the repository and cached. Concurrent misses share a single load.
    ///
    /// # Errors
    ///
    /// Repository errors propagate and nothing is cached.
    pub async fn get_all(&self) -> Result<Vec<T>> {
        let timer = Instant::now();
        let cache_key = CacheKeyBuilder::collection::<T>();

        if let Some(items) = self.read_entry::<Vec<T>>(&cache_key).await {
            debug!("✓ Cache hit for {} ({} items)", cache_key, items.len());
            self.metrics.record_hit(&cache_key, timer.elapsed());
            return Ok(items);
        }

        let _gate = self.gates.acquire(&cache_key).await;
        if let Some(items) = self.read_entry::<Vec<T>>(&cache_key).await {
            debug!("✓ Cache hit for {} after waiting on load", cache_key);
            self.metrics.record_hit(&cache_key, timer.elapsed());
            return Ok(items);
        }

        debug!("Cache miss for {}, loading from repository", cache_key);
        let items = self
            .repository
            .fetch_all()
            .await
            .map_err(|e| record_failure(self.metrics.as_ref(), &cache_key, e))?;

        self.populate(&cache_key, &items).await;
        self.metrics.record_miss(&cache_key, timer.elapsed());
        Ok(items)
    }

    /// The entity with secondary key `key`, or `None` if the repository has
    /// no such record. Absence is cached like any other result.
    ///
    /// # Errors
    ///
    /// Repository errors propagate and nothing is cached.
    pub async fn get_by_key(&self, key: &T::Key) -> Result<Option<T>> {
        let timer = Instant::now();
        let cache_key = CacheKeyBuilder::item::<T>(key);

        if let Some(entity) = self.read_entry::<Option<T>>(&cache_key).await {
            debug!("✓ Cache hit for {}", cache_key);
            self.metrics.record_hit(&cache_key, timer.elapsed());
            return Ok(entity);
        }

        let _gate = self.gates.acquire(&cache_key).await;
        if let Some(entity) = self.read_entry::<Option<T>>(&cache_key).await {
            debug!("✓ Cache hit for {} after waiting on load", cache_key);
            self.metrics.record_hit(&cache_key, timer.elapsed());
            return Ok(entity);
        }

        debug!("Cache miss for {}, loading from repository", cache_key);
        let entity = self
            .repository
            .fetch_by_key(key)
            .await
            .map_err(|e| record_failure(self.metrics.as_ref(), &cache_key, e))?;

        if entity.is_none() {
            debug!("{} not found, caching absence", cache_key);
        }
        self.populate(&cache_key, &entity).await;
        self.metrics.record_miss(&cache_key, timer.elapsed());
        Ok(entity)
    }

    /// Insert or replace `entity` and mirror it into both cache shapes.
    ///
    /// Returns the entity unchanged. The write and the cache update run as
    /// one spawned task, so dropping the returned future does not stop the
    /// cache from catching up with the repository.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: the entity failed [`CacheEntity::validate`]
    /// - any repository error
    ///
    /// On error the cache is left exactly as it was. Once the repository has
    /// accepted the write, cache failures are logged and the affected entries
    /// are invalidated instead of being returned.
    pub async fn upsert(&self, entity: T) -> Result<T> {
        let timer = Instant::now();
        entity.validate()?;
        let item_bytes = serialize_for_cache(&Some(&entity))?;
        let item_key = CacheKeyBuilder::item::<T>(&entity.secondary_key());

        let repository = Arc::clone(&self.repository);
        let sync = self.write_sync();
        let task_key = item_key.clone();
        let write = tokio::spawn(async move {
            repository
                .upsert(&entity)
                .await
                .map_err(|e| record_failure(sync.metrics.as_ref(), &task_key, e))?;

            sync.store_item(&task_key, item_bytes).await;
            let key = entity.secondary_key();
            sync.patch_collection(TtlUpdate::Reset(sync.ttl), |items: &mut Vec<T>| {
                match items.iter_mut().find(|item| item.secondary_key() == key) {
                    Some(item) => *item = entity.clone(),
                    None => items.push(entity.clone()),
                }
            })
            .await;

            sync.metrics.record_write(&task_key, timer.elapsed());
            info!("✓ {} upserted in {:?}", task_key, timer.elapsed());
            Ok(entity)
        });

        join_write(write, &item_key).await
    }

    /// Delete the entity with secondary key `key` and drop it from both cache
    /// shapes. Deleting a missing key succeeds and still clears stale entries.
    ///
    /// The collection entry keeps its current expiry. Like
    /// [`upsert`](Self::upsert), the delete runs to completion even if the
    /// returned future is dropped.
    ///
    /// # Errors
    ///
    /// Repository errors propagate and the cache is left exactly as it was.
    pub async fn delete_by_key(&self, key: &T::Key) -> Result<()> {
        let timer = Instant::now();
        let item_key = CacheKeyBuilder::item::<T>(key);

        let repository = Arc::clone(&self.repository);
        let sync = self.write_sync();
        let task_key = item_key.clone();
        let key = key.clone();
        let delete = tokio::spawn(async move {
            repository
                .delete_by_key(&key)
                .await
                .map_err(|e| record_failure(sync.metrics.as_ref(), &task_key, e))?;

            sync.remove_item(&task_key).await;
            sync.patch_collection(TtlUpdate::Preserve, |items: &mut Vec<T>| {
                items.retain(|item| item.secondary_key() != key);
            })
            .await;

            sync.metrics.record_write(&task_key, timer.elapsed());
            info!("✓ {} deleted in {:?}", task_key, timer.elapsed());
            Ok(())
        });

        join_write(delete, &item_key).await
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn ttl(&self) -> Option<Duration> {
        self.ttl_policy.get_ttl(T::cache_prefix())
    }

    fn write_sync(&self) -> WriteSync<B> {
        WriteSync {
            backend: self.backend.clone(),
            metrics: Arc::clone(&self.metrics),
            gates: Arc::clone(&self.gates),
            ttl: self.ttl(),
        }
    }

    /// Read and decode a cache entry. Unreadable entries count as absent and
    /// are dropped so the caller repopulates them.
    async fn read_entry<V: DeserializeOwned>(&self, cache_key: &str) -> Option<V> {
        let bytes = match self.backend.get(cache_key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!("Cache read for {} failed, treating as miss: {}", cache_key, e);
                return None;
            }
        };

        match deserialize_from_cache(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Dropping unreadable cache entry {}: {}", cache_key, e);
                let _ = self.backend.delete(cache_key).await;
                None
            }
        }
    }

    /// Store a freshly loaded value. Failures are logged, not returned: the
    /// caller already has the value and the next read retries the load.
    async fn populate<V: serde::Serialize + ?Sized>(&self, cache_key: &str, value: &V) {
        let result = match serialize_for_cache(value) {
            Ok(bytes) => self.backend.set(cache_key, bytes, self.ttl()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to populate cache entry {}: {}", cache_key, e);
            self.metrics.record_error(cache_key, &e.to_string());
        }
    }
}

/// Cache side of a write, owned by the write task.
///
/// Every step runs after the repository accepted the write, so failures are
/// logged and recorded, never returned.
struct WriteSync<B> {
    backend: B,
    metrics: Arc<dyn CacheMetrics>,
    gates: Arc<KeyGates>,
    ttl: Option<Duration>,
}

impl<B: CacheBackend> WriteSync<B> {
    async fn store_item(&self, item_key: &str, bytes: Vec<u8>) {
        let _gate = self.gates.acquire(item_key).await;
        if let Err(e) = self.backend.set(item_key, bytes, self.ttl).await {
            warn!("Failed to store {} after write, invalidating it: {}", item_key, e);
            self.metrics.record_error(item_key, &e.to_string());
            self.invalidate(item_key).await;
        }
    }

    async fn remove_item(&self, item_key: &str) {
        let _gate = self.gates.acquire(item_key).await;
        if let Err(e) = self.backend.delete(item_key).await {
            error!("Failed to remove {} after delete: {}", item_key, e);
            self.metrics.record_error(item_key, &e.to_string());
        }
    }

    /// Edit the cached collection in place if it is cached. An entry that
    /// cannot be patched is removed rather than left stale.
    async fn patch_collection<T, F>(&self, ttl: TtlUpdate, edit: F)
    where
        T: CacheEntity,
        F: FnOnce(&mut Vec<T>) + Send,
    {
        let collection_key = CacheKeyBuilder::collection::<T>();
        let _gate = self.gates.acquire(&collection_key).await;

        let patched = self
            .backend
            .update(&collection_key, ttl, move |bytes| {
                let mut items: Vec<T> = deserialize_from_cache(bytes)?;
                edit(&mut items);
                serialize_for_cache(&items)
            })
            .await;

        match patched {
            Ok(true) => debug!("✓ Patched {} in place", collection_key),
            Ok(false) => debug!(
                "{} not cached, next read loads it from the repository",
                collection_key
            ),
            Err(e) => {
                warn!("Cannot patch {}, dropping it: {}", collection_key, e);
                self.metrics.record_error(&collection_key, &e.to_string());
                self.invalidate(&collection_key).await;
            }
        }
    }

    /// Caller holds the key's gate.
    async fn invalidate(&self, cache_key: &str) {
        if let Err(e) = self.backend.delete(cache_key).await {
            error!(
                "Failed to invalidate {}, it may be stale until it expires: {}",
                cache_key, e
            );
        }
    }
}

fn record_failure(metrics: &dyn CacheMetrics, cache_key: &str, error: Error) -> Error {
    metrics.record_error(cache_key, &error.to_string());
    error
}

async fn join_write<V>(write: JoinHandle<Result<V>>, cache_key: &str) -> Result<V> {
    match write.await {
        Ok(result) => result,
        Err(e) => {
            error!("Write task for {} did not complete: {}", cache_key, e);
            Err(Error::RepositoryError(format!(
                "write to {} did not complete: {}",
                cache_key, e
            )))
        }
    }
}
