//! Data repository trait and implementations.
//!
//! A repository translates the four catalog operations into store calls for
//! one entity kind. It does no caching.

use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use crate::store::{Document, StoreClient};
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for data repository implementations.
///
/// All lookups go through the entity's secondary key.
pub trait DataRepository<T: CacheEntity>: Send + Sync + 'static {
    /// Every stored entity of this kind.
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<T>>> + Send;

    /// The entity with this secondary key. `Ok(None)` when nothing matches.
    fn fetch_by_key(&self, key: &T::Key) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Insert or replace the entity with `entity`'s secondary key.
    fn upsert(&self, entity: &T) -> impl Future<Output = Result<()>> + Send;

    /// Delete the entity with this secondary key. Missing is not an error.
    fn delete_by_key(&self, key: &T::Key) -> impl Future<Output = Result<()>> + Send;
}

/// Repository backed by a [`StoreClient`].
///
/// Entities are stored as JSON documents in `T::collection_name()`, matched on
/// `T::key_field()`.
pub struct StoreRepository<T, S> {
    store: Arc<S>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S> StoreRepository<T, S> {
    pub fn new(store: Arc<S>) -> Self {
        StoreRepository {
            store,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<T, S> Clone for StoreRepository<T, S> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.store))
    }
}

fn key_value<T: CacheEntity>(key: &T::Key) -> Result<Value> {
    serde_json::to_value(key).map_err(|e| Error::SerializationError(e.to_string()))
}

fn to_document<T: CacheEntity>(entity: &T) -> Result<Document> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(other) => Err(Error::SerializationError(format!(
            "{} must serialize to an object, got {}",
            T::cache_prefix(),
            other
        ))),
        Err(e) => Err(Error::SerializationError(e.to_string())),
    }
}

fn from_document<T: CacheEntity>(doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| {
        Error::DeserializationError(format!(
            "stored {} does not match its schema: {}",
            T::cache_prefix(),
            e
        ))
    })
}

impl<T, S> DataRepository<T> for StoreRepository<T, S>
where
    T: CacheEntity,
    S: StoreClient,
{
    async fn fetch_all(&self) -> Result<Vec<T>> {
        let docs = self.store.find_all(T::collection_name()).await?;
        debug!("Loaded {} {} records", docs.len(), T::cache_prefix());
        docs.into_iter().map(from_document).collect()
    }

    async fn fetch_by_key(&self, key: &T::Key) -> Result<Option<T>> {
        let value = key_value::<T>(key)?;
        self.store
            .find_one(T::collection_name(), T::key_field(), &value)
            .await?
            .map(from_document)
            .transpose()
    }

    async fn upsert(&self, entity: &T) -> Result<()> {
        let value = key_value::<T>(&entity.secondary_key())?;
        let doc = to_document(entity)?;
        self.store
            .upsert(T::collection_name(), T::key_field(), &value, doc)
            .await
    }

    async fn delete_by_key(&self, key: &T::Key) -> Result<()> {
        let value = key_value::<T>(key)?;
        self.store
            .delete_one(T::collection_name(), T::key_field(), &value)
            .await
    }
}

/// Repository that keeps entities in a map, keyed by secondary key.
///
/// Useful for tests and for wiring the coordinator without a store.
pub struct InMemoryRepository<T: CacheEntity> {
    data: Arc<DashMap<T::Key, T>>,
}

impl<T: CacheEntity> InMemoryRepository<T> {
    pub fn new() -> Self {
        InMemoryRepository {
            data: Arc::new(DashMap::new()),
        }
    }

    /// Insert an entity, replacing any with the same secondary key.
    pub fn insert(&self, entity: T) {
        self.data.insert(entity.secondary_key(), entity);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: CacheEntity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheEntity> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        InMemoryRepository {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: CacheEntity> DataRepository<T> for InMemoryRepository<T> {
    async fn fetch_all(&self) -> Result<Vec<T>> {
        Ok(self.data.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn fetch_by_key(&self, key: &T::Key) -> Result<Option<T>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, entity: &T) -> Result<()> {
        self.insert(entity.clone());
        Ok(())
    }

    async fn delete_by_key(&self, key: &T::Key) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }
}
