// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::feed::FeedFormat;

pub const DEFAULT_PORT: u16 = 5701;

/// Knobs for the background refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    /// Listed offerings older than this many days are no longer refreshed.
    pub retention_days: i64,
    pub concurrency: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            interval: Duration::from_secs(60 * 60),
            fetch_timeout: Duration::from_secs(30),
            retention_days: 30,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub feed_url: Option<String>,
    pub feed_format: FeedFormat,
    pub refresh: RefreshConfig,
    pub cache_ttl: Duration,
    pub snapshot_path: Option<PathBuf>,
}

impl AppConfig {
    /// Reads the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT").or_else(|| lookup("IPO_PORT")) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT must be a number, got '{}'", value))?,
            None => {
                warn!("$PORT not set, defaulting to {}", DEFAULT_PORT);
                DEFAULT_PORT
            }
        };

        let defaults = RefreshConfig::default();
        let refresh = RefreshConfig {
            interval: Duration::from_secs(parse_or(
                &lookup,
                "IPO_REFRESH_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "IPO_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            retention_days: parse_or(&lookup, "IPO_RETENTION_DAYS", defaults.retention_days)?,
            concurrency: parse_or(&lookup, "IPO_REFRESH_CONCURRENCY", defaults.concurrency)?,
        };
        let cache_ttl = Duration::from_secs(parse_or(&lookup, "IPO_CACHE_TTL_SECS", 300u64)?);

        let feed_format = match lookup("IPO_FEED_FORMAT") {
            Some(value) => value.parse::<FeedFormat>().map_err(|e| anyhow!(e))?,
            None => FeedFormat::Json,
        };

        let config = AppConfig {
            port,
            feed_url: lookup("IPO_FEED_URL").filter(|url| !url.trim().is_empty()),
            feed_format,
            refresh,
            cache_ttl,
            snapshot_path: lookup("IPO_SNAPSHOT_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh.interval.is_zero() {
            bail!("IPO_REFRESH_INTERVAL_SECS must be positive");
        }
        if self.refresh.fetch_timeout.is_zero() {
            bail!("IPO_FETCH_TIMEOUT_SECS must be positive");
        }
        if self.refresh.retention_days < 0 {
            bail!("IPO_RETENTION_DAYS must not be negative");
        }
        if self.refresh.concurrency == 0 {
            bail!("IPO_REFRESH_CONCURRENCY must be at least 1");
        }
        if self.cache_ttl >= self.refresh.interval {
            bail!(
                "IPO_CACHE_TTL_SECS ({}s) must be shorter than the refresh interval ({}s)",
                self.cache_ttl.as_secs(),
                self.refresh.interval.as_secs()
            );
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, value, e)),
        None => Ok(default),
    }
}
