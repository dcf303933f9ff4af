//! Document store client.
//!
//! The store is the persistence collaborator behind the repositories: it
//! keeps one collection of JSON documents per entity kind, each document
//! carrying a store-assigned `id` and a unique secondary-key field.

use crate::error::{Error, Result};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A stored record.
pub type Document = Map<String, Value>;

/// Name of the store-assigned primary key field.
pub const ID_FIELD: &str = "id";

/// Minimal contract the repositories need from a document store.
pub trait StoreClient: Send + Sync + 'static {
    /// Every document in `collection`.
    fn find_all(&self, collection: &str) -> impl Future<Output = Result<Vec<Document>>> + Send;

    /// The document whose `field` equals `value`, if any.
    fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Insert `record`, or replace the document whose `field` equals `value`.
    ///
    /// The replaced document keeps its store-assigned id.
    fn upsert(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        record: Document,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete the document whose `field` equals `value`. Missing is not an error.
    fn delete_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Check that the store is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;
}

struct Inner {
    collections: DashMap<String, Vec<Document>>,
    snapshot: Option<PathBuf>,
    // Serialises writers so a failed snapshot can be rolled back safely.
    write_lock: tokio::sync::Mutex<()>,
    available: AtomicBool,
}

/// In-process document store, optionally persisted to a JSON snapshot file.
///
/// Reads never wait on writers. Writers are serialised; with a snapshot path
/// configured each successful write rewrites the snapshot, and a write whose
/// snapshot cannot be saved is rolled back and reported as
/// [`Error::StoreUnavailable`].
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty, purely in-memory store.
    pub fn new() -> Self {
        Self::with_state(DashMap::new(), None)
    }

    /// Open a store persisted at `path`, loading the snapshot if it exists.
    ///
    /// # Errors
    /// Returns `Error::StoreUnavailable` if the snapshot exists but cannot be
    /// read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = DashMap::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let parsed: BTreeMap<String, Vec<Document>> = serde_json::from_slice(&bytes)
                    .map_err(|e| {
                        Error::StoreUnavailable(format!(
                            "snapshot {} is not valid: {}",
                            path.display(),
                            e
                        ))
                    })?;
                let mut count = 0;
                for (name, docs) in parsed {
                    count += docs.len();
                    collections.insert(name, docs);
                }
                info!(
                    "✓ Document store loaded {} records from {}",
                    count,
                    path.display()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Document store snapshot {} not found, starting empty",
                    path.display()
                );
            }
            Err(e) => {
                return Err(Error::StoreUnavailable(format!(
                    "cannot read snapshot {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        Ok(Self::with_state(collections, Some(path)))
    }

    fn with_state(collections: DashMap<String, Vec<Document>>, snapshot: Option<PathBuf>) -> Self {
        MemoryStore {
            inner: Arc::new(Inner {
                collections,
                snapshot,
                write_lock: tokio::sync::Mutex::new(()),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Mark the store reachable or unreachable.
    ///
    /// While unreachable every operation fails with `Error::StoreUnavailable`,
    /// which lets callers exercise outage handling without a real outage.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        if available {
            info!("Document store marked available");
        } else {
            warn!("⚠ Document store marked unavailable");
        }
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.inner
            .collections
            .get(collection)
            .map_or(0, |docs| docs.len())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable(
                "document store is not reachable".to_string(),
            ))
        }
    }

    fn previous_state(&self, collection: &str) -> Option<Option<Vec<Document>>> {
        self.inner
            .snapshot
            .as_ref()
            .map(|_| self.inner.collections.get(collection).map(|docs| docs.value().clone()))
    }

    /// Write the snapshot, restoring `collection` to `previous` on failure.
    async fn persist(&self, collection: &str, previous: Option<Option<Vec<Document>>>) -> Result<()> {
        let (Some(path), Some(previous)) = (self.inner.snapshot.as_ref(), previous) else {
            return Ok(());
        };

        let state: BTreeMap<String, Vec<Document>> = self
            .inner
            .collections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let result = match serde_json::to_vec_pretty(&state) {
            Ok(bytes) => write_atomically(path, &bytes).await,
            Err(e) => Err(e.to_string()),
        };

        if let Err(e) = result {
            match previous {
                Some(docs) => {
                    self.inner.collections.insert(collection.to_string(), docs);
                }
                None => {
                    self.inner.collections.remove(collection);
                }
            }
            error!(
                "Failed to persist snapshot {}: {} (write rolled back)",
                path.display(),
                e
            );
            return Err(Error::StoreUnavailable(format!(
                "cannot persist snapshot {}: {}",
                path.display(),
                e
            )));
        }

        Ok(())
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> std::result::Result<(), String> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| e.to_string())?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| e.to_string())
}

fn new_id() -> Value {
    Value::String(uuid::Uuid::now_v7().to_string())
}

impl StoreClient for MemoryStore {
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.ensure_available()?;
        Ok(self
            .inner
            .collections
            .get(collection)
            .map(|docs| docs.value().clone())
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, field: &str, value: &Value) -> Result<Option<Document>> {
        self.ensure_available()?;
        Ok(self.inner.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| doc.get(field) == Some(value))
                .cloned()
        }))
    }

    async fn upsert(&self, collection: &str, field: &str, value: &Value, mut record: Document) -> Result<()> {
        self.ensure_available()?;
        let _write = self.inner.write_lock.lock().await;
        let previous = self.previous_state(collection);

        record.insert(field.to_string(), value.clone());
        {
            let mut docs = self
                .inner
                .collections
                .entry(collection.to_string())
                .or_default();
            match docs.iter_mut().find(|doc| doc.get(field) == Some(value)) {
                Some(existing) => {
                    let id = existing.get(ID_FIELD).cloned().unwrap_or_else(new_id);
                    record.insert(ID_FIELD.to_string(), id);
                    *existing = record;
                }
                None => {
                    record.insert(ID_FIELD.to_string(), new_id());
                    docs.push(record);
                }
            }
        }

        self.persist(collection, previous).await?;
        debug!("✓ Store UPSERT {}[{}={}]", collection, field, value);
        Ok(())
    }

    async fn delete_one(&self, collection: &str, field: &str, value: &Value) -> Result<()> {
        self.ensure_available()?;
        let _write = self.inner.write_lock.lock().await;
        let previous = self.previous_state(collection);

        let removed = match self.inner.collections.get_mut(collection) {
            Some(mut docs) => match docs.iter().position(|doc| doc.get(field) == Some(value)) {
                Some(index) => {
                    docs.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };

        if removed {
            self.persist(collection, previous).await?;
        }
        debug!(
            "✓ Store DELETE {}[{}={}] (removed: {})",
            collection, field, value, removed
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.inner.available.load(Ordering::SeqCst))
    }
}
