//! Configuration module for walletpulse.
//!
//! All settings are loaded once at startup from environment variables
//! (with `.env` support in the binaries) into a single immutable
//! [`Config`] value that is threaded through constructors.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQL connection string.
    pub database_url: String,

    // Ingestion
    pub max_concurrency: usize,
    pub request_timeout_sec: u64,
    pub universe_size: usize,

    // Cadences
    pub universe_refresh_hours: i64,
    pub snapshot_interval_sec: u64,
    pub signal_interval_sec: u64,

    // Hyperliquid endpoints
    pub stats_url: String,
    pub api_url: String,

    // Health
    pub stale_threshold_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost:5432/hyperliquid".to_string(),
            max_concurrency: 8,
            request_timeout_sec: 15,
            universe_size: 200,
            universe_refresh_hours: 6,
            snapshot_interval_sec: 60,
            signal_interval_sec: 300,
            stats_url: "https://stats-data.hyperliquid.xyz".to_string(),
            api_url: "https://api.hyperliquid.xyz".to_string(),
            stale_threshold_minutes: 3,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_concurrency: parse_var("MAX_CONCURRENCY", defaults.max_concurrency)?,
            request_timeout_sec: parse_var("REQUEST_TIMEOUT_SEC", defaults.request_timeout_sec)?,
            universe_size: parse_var("UNIVERSE_SIZE", defaults.universe_size)?,
            universe_refresh_hours: parse_var(
                "UNIVERSE_REFRESH_HOURS",
                defaults.universe_refresh_hours,
            )?,
            snapshot_interval_sec: parse_var(
                "SNAPSHOT_INTERVAL_SEC",
                defaults.snapshot_interval_sec,
            )?,
            signal_interval_sec: parse_var("SIGNAL_INTERVAL_SEC", defaults.signal_interval_sec)?,
            stats_url: env::var("HYPERLIQUID_STATS_URL").unwrap_or(defaults.stats_url),
            api_url: env::var("HYPERLIQUID_API_URL").unwrap_or(defaults.api_url),
            stale_threshold_minutes: parse_var(
                "STALE_THRESHOLD_MINUTES",
                defaults.stale_threshold_minutes,
            )?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    pub fn snapshot_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.snapshot_interval_sec as i64)
    }

    pub fn signal_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.signal_interval_sec as i64)
    }
}

/// Parse an env var, keeping the default when unset. An unparsable value
/// is an error rather than a silent fallback.
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
