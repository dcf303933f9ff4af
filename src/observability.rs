//! Metrics hooks and TTL policy.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// TTL applied to cache entries when no policy is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Hooks invoked by the cache coordinator.
///
/// All methods default to no-ops so implementors only override what they need.
pub trait CacheMetrics: Send + Sync {
    /// A read was served from the cache.
    fn record_hit(&self, _key: &str, _duration: Duration) {}

    /// A read missed and was loaded from the repository.
    fn record_miss(&self, _key: &str, _duration: Duration) {}

    /// A repository write was mirrored into the cache.
    fn record_write(&self, _key: &str, _duration: Duration) {}

    /// An operation failed.
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics sink that discards everything.
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

/// Lock-free counters, rendered in Prometheus text format.
#[derive(Default)]
pub struct CounterMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
    latency_us_total: AtomicU64,
}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
    pub latency_us_total: u64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            latency_us_total: self.latency_us_total.load(Ordering::Relaxed),
        }
    }

    /// Render counters in Prometheus exposition format.
    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        let reads = s.hits + s.misses;
        let hit_ratio = if reads == 0 {
            0.0
        } else {
            s.hits as f64 / reads as f64
        };

        let mut out = String::new();
        let counters = [
            ("catalog_cache_hits_total", "Reads served from cache", s.hits),
            ("catalog_cache_misses_total", "Reads loaded from the store", s.misses),
            ("catalog_cache_writes_total", "Writes mirrored into the cache", s.writes),
            ("catalog_cache_errors_total", "Failed cache operations", s.errors),
            (
                "catalog_cache_latency_microseconds_total",
                "Accumulated operation latency",
                s.latency_us_total,
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value);
        }
        let _ = writeln!(out, "# HELP catalog_cache_hit_ratio Share of reads served from cache");
        let _ = writeln!(out, "# TYPE catalog_cache_hit_ratio gauge");
        let _ = writeln!(out, "catalog_cache_hit_ratio {:.4}", hit_ratio);
        out
    }

    fn add_latency(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.latency_us_total.fetch_add(micros, Ordering::Relaxed);
    }
}

impl CacheMetrics for CounterMetrics {
    fn record_hit(&self, _key: &str, duration: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.add_latency(duration);
    }

    fn record_miss(&self, _key: &str, duration: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.add_latency(duration);
    }

    fn record_write(&self, _key: &str, duration: Duration) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.add_latency(duration);
    }

    fn record_error(&self, _key: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// How long cache entries live.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TtlPolicy {
    /// [`DEFAULT_TTL`] for every entity kind.
    #[default]
    Default,
    /// The same TTL for every entity kind.
    Fixed(Duration),
    /// Entries never expire.
    Infinite,
    /// Per cache prefix, falling back to [`DEFAULT_TTL`].
    PerType(HashMap<String, Duration>),
}

impl TtlPolicy {
    /// TTL for entries under `prefix`; `None` means no expiry.
    pub fn get_ttl(&self, prefix: &str) -> Option<Duration> {
        match self {
            TtlPolicy::Default => Some(DEFAULT_TTL),
            TtlPolicy::Fixed(ttl) => Some(*ttl),
            TtlPolicy::Infinite => None,
            TtlPolicy::PerType(map) => Some(map.get(prefix).copied().unwrap_or(DEFAULT_TTL)),
        }
    }
}
