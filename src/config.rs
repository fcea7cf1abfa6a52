//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::worker::{BackoffSchedule, WorkerConfig};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (accounts and queue)
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Wait between polls when the queue is empty
    pub poll_interval: Duration,

    /// Lease taken on a peeked message
    pub lock_duration: Duration,

    /// How long completed messages are kept before housekeeping removes them
    pub queue_retention: Duration,

    /// How often housekeeping runs
    pub housekeeping_interval: Duration,

    /// Environment (development, production)
    pub environment: String,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?;
        let poll_interval = Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 10)?);
        let lock_duration = Duration::from_secs(parse_or(&lookup, "LOCK_DURATION_SECS", 300)?);
        let queue_retention = parse_or::<u64, _>(&lookup, "QUEUE_RETENTION_HOURS", 168)?
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidValue("QUEUE_RETENTION_HOURS"))?;
        let housekeeping_interval =
            Duration::from_secs(parse_or(&lookup, "HOUSEKEEPING_INTERVAL_SECS", 3600)?);

        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue("POLL_INTERVAL_SECS"));
        }
        if housekeeping_interval.is_zero() {
            return Err(ConfigError::InvalidValue("HOUSEKEEPING_INTERVAL_SECS"));
        }
        // The lease has to outlive a full retry sequence
        if lock_duration <= BackoffSchedule::default().total_delay() {
            return Err(ConfigError::InvalidValue("LOCK_DURATION_SECS"));
        }

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            poll_interval,
            lock_duration,
            queue_retention,
            housekeeping_interval,
            environment,
            log_format,
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: self.poll_interval,
            schedule: BackoffSchedule::default(),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
