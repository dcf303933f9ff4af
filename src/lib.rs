//! # catalog-cache
//!
//! A book and user catalog served through a coherent read-through /
//! write-through cache.
//!
//! ## Features
//!
//! - **Two cache shapes per kind:** one entry per record (`book:item:Dune`)
//!   and one entry for the whole collection (`book:all`)
//! - **Write-through patching:** a successful write updates the item entry and
//!   patches the cached collection in place instead of invalidating it
//! - **Cached absence:** a lookup that finds nothing is remembered until the
//!   entry expires or the record is written
//! - **Single-flight loads:** concurrent misses on one key share one
//!   repository call
//! - **Backend agnostic:** any [`CacheBackend`] works; an in-memory DashMap
//!   backend ships with the crate
//!
//! ## Quick Start
//!
//! ```ignore
//! use catalog_cache::{backend::InMemoryBackend, Book, CatalogService, MemoryStore};
//! use std::sync::Arc;
//!
//! let catalog = CatalogService::new(Arc::new(MemoryStore::new()), InMemoryBackend::new());
//!
//! catalog.books().upsert(Book {
//!     id: None,
//!     name: "Dune".to_string(),
//!     description: String::new(),
//!     author: "Frank Herbert".to_string(),
//!     year: 1965,
//!     publisher: "Chilton".to_string(),
//! }).await?;
//!
//! // Served from the cache entry written above
//! let dune = catalog.books().get_by_key(&"Dune".to_string()).await?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
mod gate;
#[cfg(feature = "server")]
pub mod http;
pub mod key;
pub mod model;
pub mod observability;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use backend::{CacheBackend, TtlUpdate};
pub use config::ServerConfig;
pub use coordinator::CacheCoordinator;
pub use entity::CacheEntity;
pub use error::{Error, Result};
pub use key::CacheKeyBuilder;
pub use model::{Book, User};
pub use observability::{CacheMetrics, CounterMetrics, TtlPolicy};
pub use repository::{DataRepository, InMemoryRepository, StoreRepository};
pub use service::{CatalogService, HealthReport};
pub use store::{MemoryStore, StoreClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
