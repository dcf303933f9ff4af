//! Server configuration, read from environment variables.

use crate::error::{Error, Result};
use crate::observability::DEFAULT_TTL;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_BIND_ADDR: &str = "CATALOG_BIND_ADDR";
pub const ENV_CACHE_TTL_SECS: &str = "CATALOG_CACHE_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "CATALOG_SWEEP_INTERVAL_SECS";
pub const ENV_SNAPSHOT_PATH: &str = "CATALOG_SNAPSHOT_PATH";

const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 3000);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the catalog server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// TTL for both cache shapes.
    pub cache_ttl: Duration,
    /// How often expired cache entries are purged.
    pub sweep_interval: Duration,
    /// Where the document store persists; in-memory only when `None`.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            cache_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            snapshot_path: None,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` naming the offending variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();

        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            config.bind_addr = parse(ENV_BIND_ADDR, &addr)?;
        }
        if let Some(secs) = lookup(ENV_CACHE_TTL_SECS) {
            config.cache_ttl = parse_positive_secs(ENV_CACHE_TTL_SECS, &secs)?;
        }
        if let Some(secs) = lookup(ENV_SWEEP_INTERVAL_SECS) {
            config.sweep_interval = parse_positive_secs(ENV_SWEEP_INTERVAL_SECS, &secs)?;
        }
        config.snapshot_path = lookup(ENV_SNAPSHOT_PATH)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::ConfigError(format!("{}={:?}: {}", name, raw, e)))
}

fn parse_positive_secs(name: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = parse(name, raw)?;
    if secs == 0 {
        return Err(Error::ConfigError(format!("{} must be greater than 0", name)));
    }
    Ok(Duration::from_secs(secs))
}
