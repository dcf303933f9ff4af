//! Catalog HTTP server.
//!
//! Configuration comes from `CATALOG_*` environment variables, see
//! [`catalog_cache::config`]. Log verbosity follows `RUST_LOG` (default `info`).

use catalog_cache::backend::InMemoryBackend;
use catalog_cache::{http, CatalogService, CounterMetrics, MemoryStore, ServerConfig, TtlPolicy};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    info!("Starting catalog-cache {}", catalog_cache::VERSION);

    let store = match &config.snapshot_path {
        Some(path) => MemoryStore::open(path).await?,
        None => {
            warn!("⚠ No snapshot path configured, catalog data will not survive a restart");
            MemoryStore::new()
        }
    };

    // One backend for the whole process, shared by every entity kind
    let backend = InMemoryBackend::new();
    let metrics = Arc::new(CounterMetrics::new());
    let catalog = Arc::new(CatalogService::with_options(
        Arc::new(store),
        backend.clone(),
        TtlPolicy::Fixed(config.cache_ttl),
        metrics.clone(),
    ));

    tokio::spawn(sweep_expired(backend, config.sweep_interval));

    let app = http::router(catalog, metrics);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("✓ Catalog server listening on http://{}", listener.local_addr()?);
    info!("  Books:   /book/getBooks");
    info!("  Users:   /user/getUsers");
    info!("  Health:  /health");
    info!("  Metrics: /metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Catalog server stopped");
    Ok(())
}

/// Reclaim memory held by expired entries nobody reads anymore.
async fn sweep_expired(backend: InMemoryBackend, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let purged = backend.purge_expired().await;
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}
