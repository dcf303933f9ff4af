//! Catalog service: one cache coordinator per entity kind over a shared
//! cache backend and a shared store.

use crate::backend::CacheBackend;
use crate::coordinator::CacheCoordinator;
use crate::error::Result;
use crate::model::{Book, User};
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::repository::StoreRepository;
use crate::store::StoreClient;
use serde::Serialize;
use std::sync::Arc;

/// Coordinator for books over store `S` and backend `B`.
pub type BookCoordinator<S, B> = CacheCoordinator<Book, StoreRepository<Book, S>, B>;

/// Coordinator for users over store `S` and backend `B`.
pub type UserCoordinator<S, B> = CacheCoordinator<User, StoreRepository<User, S>, B>;

/// The catalog: books and users sharing one process-wide cache.
///
/// The backend is created once at start-up and injected here; nothing else
/// reaches it directly.
pub struct CatalogService<S: StoreClient, B: CacheBackend> {
    store: Arc<S>,
    backend: B,
    books: Arc<BookCoordinator<S, B>>,
    users: Arc<UserCoordinator<S, B>>,
}

/// Result of [`CatalogService::health_check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub cache: bool,
    pub store: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.cache && self.store
    }
}

impl<S: StoreClient, B: CacheBackend> CatalogService<S, B> {
    /// Wire both coordinators with the default TTL and no metrics.
    pub fn new(store: Arc<S>, backend: B) -> Self {
        Self::with_options(store, backend, TtlPolicy::default(), Arc::new(NoOpMetrics))
    }

    /// Wire both coordinators with a shared TTL policy and metrics sink.
    pub fn with_options(
        store: Arc<S>,
        backend: B,
        ttl_policy: TtlPolicy,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Self {
        let books = CacheCoordinator::new(StoreRepository::new(Arc::clone(&store)), backend.clone())
            .with_ttl_policy(ttl_policy.clone())
            .with_metrics(Arc::clone(&metrics));
        let users = CacheCoordinator::new(StoreRepository::new(Arc::clone(&store)), backend.clone())
            .with_ttl_policy(ttl_policy)
            .with_metrics(metrics);

        CatalogService {
            store,
            backend,
            books: Arc::new(books),
            users: Arc::new(users),
        }
    }

    pub fn books(&self) -> &Arc<BookCoordinator<S, B>> {
        &self.books
    }

    pub fn users(&self) -> &Arc<UserCoordinator<S, B>> {
        &self.users
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Check the cache backend and the store concurrently.
    ///
    /// A check that errors counts as unhealthy.
    pub async fn health_check(&self) -> HealthReport {
        let (cache, store) = futures::join!(self.backend.health_check(), self.store.health_check());
        let report = HealthReport {
            cache: healthy("cache", cache),
            store: healthy("store", store),
        };
        if !report.is_healthy() {
            warn!("⚠ Catalog unhealthy: {:?}", report);
        }
        report
    }
}

fn healthy(component: &str, check: Result<bool>) -> bool {
    match check {
        Ok(ok) => ok,
        Err(e) => {
            warn!("Health check for {} failed: {}", component, e);
            false
        }
    }
}
