use std::{env, time::Duration};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Cache TTL in seconds (default: 3600)
    pub cache_ttl_seconds: u64,
    /// Maximum number of cache entries (default: 10,000)
    pub cache_max_entries: usize,
    /// Upper bound on one aggregate computation in milliseconds; 0 disables
    /// the bound (default: 5,000)
    pub cache_compute_timeout_ms: u64,
    /// Path to SQLite database file (default: "mapro.db")
    /// Note: Only used when the `sqlite` feature is enabled.
    #[allow(dead_code)]
    pub sqlite_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHE_TTL_SECONDS` - Cache TTL in seconds (default: 3600)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 10,000)
    /// - `CACHE_COMPUTE_TIMEOUT_MS` - Computation timeout (default: 5,000)
    /// - `SQLITE_PATH` - SQLite database path (default: "mapro.db")
    pub fn from_env() -> Self {
        Self {
            cache_ttl_seconds: env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            cache_max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(10_000),
            cache_compute_timeout_ms: env::var("CACHE_COMPUTE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000),
            sqlite_path: env::var("SQLITE_PATH").unwrap_or_else(|_| "mapro.db".to_string()),
        }
    }

    /// Get cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Get the computation timeout, or `None` when disabled.
    pub fn compute_timeout(&self) -> Option<Duration> {
        (self.cache_compute_timeout_ms > 0)
            .then(|| Duration::from_millis(self.cache_compute_timeout_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
