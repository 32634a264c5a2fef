//! Configuration module for downtrail.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;

/// Longest default report window accepted from the environment (ten years).
pub const MAX_DEFAULT_WINDOW_HOURS: u32 = 24 * 366 * 10;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "downtrail.db")
    pub db_path: String,
    /// Upper bound on monitors fetched at once during a downtime pass (default: 8)
    pub max_concurrent_fetches: usize,
    /// Heartbeats older than this many days are pruned; 0 keeps everything (default: 180)
    pub retention_days: u32,
    /// Window length used when a downtime request gives no start (default: 24)
    pub default_window_hours: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "downtrail.db".to_string(),
            max_concurrent_fetches: 8,
            retention_days: 180,
            default_window_hours: 24,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DOWNTRAIL_HTTP_PORT`: HTTP port (default: 8080)
    /// - `DOWNTRAIL_DB_PATH`: Database file path (default: "downtrail.db")
    /// - `DOWNTRAIL_MAX_CONCURRENT_FETCHES`: fetch parallelism (default: 8, min 1)
    /// - `DOWNTRAIL_RETENTION_DAYS`: heartbeat retention (default: 180)
    /// - `DOWNTRAIL_DEFAULT_WINDOW_HOURS`: default report window (default: 24, max ten years)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "DOWNTRAIL_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("DOWNTRAIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(n) = parse_var::<usize>(&lookup, "DOWNTRAIL_MAX_CONCURRENT_FETCHES") {
            cfg.max_concurrent_fetches = n.max(1);
        }

        if let Some(days) = parse_var(&lookup, "DOWNTRAIL_RETENTION_DAYS") {
            cfg.retention_days = days;
        }

        if let Some(hours) = parse_var::<u32>(&lookup, "DOWNTRAIL_DEFAULT_WINDOW_HOURS") {
            if hours <= MAX_DEFAULT_WINDOW_HOURS {
                cfg.default_window_hours = hours;
            } else {
                tracing::warn!(
                    "Ignoring DOWNTRAIL_DEFAULT_WINDOW_HOURS={}, above the {} hour limit",
                    hours,
                    MAX_DEFAULT_WINDOW_HOURS
                );
            }
        }

        cfg
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
