//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file backing the primary store
    pub database_path: String,
    /// HTTP server port
    pub server_port: u16,
    /// Expired-record sweep interval in seconds
    pub cleanup_interval: u64,
    /// Rows read per page while loading the cache from the primary store
    pub load_page_size: usize,
    /// TTL in seconds for records written through the HTTP API, 0 = none
    pub record_ttl: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_PATH` - SQLite file (default: kv_orm.db)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 1)
    /// - `LOAD_PAGE_SIZE` - Page size for cache loads (default: 500)
    /// - `RECORD_TTL` - Record TTL in seconds (default: 0, no expiry)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            load_page_size: parse_var("LOAD_PAGE_SIZE")
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.load_page_size),
            record_ttl: parse_var("RECORD_TTL").unwrap_or(defaults.record_ttl),
        }
    }

    /// Record TTL as a duration, `None` when records never expire.
    pub fn record_ttl(&self) -> Option<Duration> {
        (self.record_ttl > 0).then(|| Duration::from_secs(self.record_ttl))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "kv_orm.db".to_string(),
            server_port: 3000,
            cleanup_interval: 1,
            load_page_size: 500,
            record_ttl: 0,
        }
    }
}
