// src/config.rs
//! Service configuration: optional TOML file overlaid by environment variables.
//!
//! Lookup order for the file:
//! 1) $TRENDS_CONFIG_PATH (must exist)
//! 2) config/trends.toml
//! 3) built-in defaults
//!
//! `DATABASE_URL` is only read from the environment and is mandatory.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::bucket::{BucketSpec, DEFAULT_BUCKET_MINUTES};
use crate::error::ConfigError;
use crate::feed::hn::DEFAULT_HN_API_URL;

pub const ENV_CONFIG_PATH: &str = "TRENDS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/trends.toml";

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_BUCKET_SIZE_MINUTES: &str = "BUCKET_SIZE_MINUTES";
pub const ENV_HN_API_URL: &str = "HN_API_URL";
pub const ENV_INGEST_INTERVAL_SECS: &str = "INGEST_INTERVAL_SECS";
pub const ENV_DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    /// `None` leaves the HTTP client's defaults in place.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub bucket: BucketSpec,
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub scheduler: Option<SchedulerConfig>,
}

/* ----------------------------
File schema (all optional)
---------------------------- */

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub bind_addr: Option<String>,
    pub bucket_size_minutes: Option<u32>,
    #[serde(default)]
    pub feed: FileFeed,
    #[serde(default)]
    pub database: FileDatabase,
    #[serde(default)]
    pub scheduler: FileScheduler,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileFeed {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileDatabase {
    pub max_connections: Option<u32>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileScheduler {
    pub interval_secs: Option<u64>,
}

impl FileConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(ConfigError::File {
                    path: pb.display().to_string(),
                    reason: format!("{ENV_CONFIG_PATH} points to non-existent path"),
                });
            }
            return Self::load_from(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }
}

fn parse_env<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

impl AppConfig {
    /// Load `.env`-populated process environment over the default config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = FileConfig::load_default()?;
        Self::from_sources(file, |k| std::env::var(k).ok())
    }

    /// Merge a parsed file with an environment lookup. Environment wins.
    pub fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let url = env(ENV_DATABASE_URL)
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        parse_database_url(&url)?;

        let minutes = parse_env::<u32>(&env, ENV_BUCKET_SIZE_MINUTES)?
            .or(file.bucket_size_minutes)
            .unwrap_or(DEFAULT_BUCKET_MINUTES);
        let bucket = BucketSpec::new(minutes)?;

        let max_connections = parse_env::<u32>(&env, ENV_DB_MAX_CONNECTIONS)?
            .or(file.database.max_connections)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_DB_MAX_CONNECTIONS,
                value: "0".into(),
            });
        }

        let interval_secs = parse_env::<u64>(&env, ENV_INGEST_INTERVAL_SECS)?
            .or(file.scheduler.interval_secs)
            .filter(|s| *s > 0);

        Ok(Self {
            bind_addr: env(ENV_BIND_ADDR)
                .or(file.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            bucket,
            database: DatabaseConfig {
                url,
                max_connections,
                acquire_timeout: Duration::from_millis(
                    file.database
                        .acquire_timeout_ms
                        .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
                ),
                idle_timeout: Duration::from_millis(
                    file.database.idle_timeout_ms.unwrap_or(DEFAULT_IDLE_TIMEOUT_MS),
                ),
            },
            feed: FeedConfig {
                url: env(ENV_HN_API_URL)
                    .or(file.feed.url)
                    .unwrap_or_else(|| DEFAULT_HN_API_URL.to_string()),
                timeout: file.feed.timeout_secs.map(Duration::from_secs),
            },
            scheduler: interval_secs.map(|s| SchedulerConfig {
                interval: Duration::from_secs(s),
            }),
        })
    }
}

/// Parse a `postgres://` / `postgresql://` URL into connect options.
///
/// Used both at config load and by [`crate::store::Database::init`].
pub fn parse_database_url(url: &str) -> Result<PgConnectOptions, ConfigError> {
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        return Err(ConfigError::InvalidDatabaseUrl(
            "expected a postgres:// URL".into(),
        ));
    }
    PgConnectOptions::from_str(url).map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))
}
