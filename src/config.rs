use std::env;
use std::str::FromStr;

use crate::error::{MonitorError, Result};
use crate::models::distinct_tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Emulator,
    DuckDb,
}

impl FromStr for Backend {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "emulator" => Ok(Backend::Emulator),
            "duckdb" => Ok(Backend::DuckDb),
            other => Err(MonitorError::Config(format!(
                "Invalid MONITOR_BACKEND {}. Must be 'emulator' or 'duckdb'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub duckdb_path: Option<String>,
    pub emulate_latency_ms: u64,
    pub default_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Most instance tags one request may name.
    pub max_tags: usize,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            backend: Backend::Emulator,
            duckdb_path: None,
            emulate_latency_ms: 1000,
            default_interval_secs: 3600,
            max_interval_secs: 7 * 24 * 3600,
            max_tags: 32,
            log_filter: "sys_monitor=info,tower_http=info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            port: parse_or(&lookup, "MONITOR_PORT", defaults.port)?,
            backend: parse_or(&lookup, "MONITOR_BACKEND", defaults.backend)?,
            duckdb_path: lookup("MONITOR_DUCKDB_PATH").filter(|p| !p.is_empty()),
            emulate_latency_ms: parse_or(&lookup, "MONITOR_EMULATE_LATENCY_MS", defaults.emulate_latency_ms)?,
            default_interval_secs: parse_or(&lookup, "MONITOR_DEFAULT_INTERVAL_SECS", defaults.default_interval_secs)?,
            max_interval_secs: parse_or(&lookup, "MONITOR_MAX_INTERVAL_SECS", defaults.max_interval_secs)?,
            max_tags: parse_or(&lookup, "MONITOR_MAX_TAGS", defaults.max_tags)?,
            log_filter: lookup("MONITOR_LOG").unwrap_or(defaults.log_filter),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_interval_secs == 0 || self.default_interval_secs > self.max_interval_secs {
            return Err(MonitorError::Config(format!(
                "MONITOR_DEFAULT_INTERVAL_SECS must be between 1 and {}",
                self.max_interval_secs
            )));
        }
        if self.max_tags == 0 {
            return Err(MonitorError::Config("MONITOR_MAX_TAGS must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Collapses repeated tags and rejects requests naming more than
    /// `max_tags` distinct ones.
    pub fn tags(&self, requested: &[String]) -> Result<Vec<String>> {
        let tags = distinct_tags(requested);
        if tags.len() > self.max_tags {
            return Err(MonitorError::InvalidQuery(format!(
                "at most {} tags may be requested, got {}",
                self.max_tags,
                tags.len()
            )));
        }
        Ok(tags)
    }

    /// Resolves a requested lookback window against the configured limits.
    pub fn interval(&self, requested: Option<u64>) -> Result<u64> {
        let interval = requested.unwrap_or(self.default_interval_secs);
        if interval == 0 || interval > self.max_interval_secs {
            return Err(MonitorError::InvalidQuery(format!(
                "interval must be between 1 and {} seconds",
                self.max_interval_secs
            )));
        }
        Ok(interval)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| MonitorError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
