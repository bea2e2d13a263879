use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Configuration for the background data-collection subsystem, loaded from
/// environment variables. See §6 of the specification for the recognized
/// options and their defaults.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub database_url: String,
    /// Master switch for the subsystem.
    pub enabled: bool,
    /// Duration between Watcher ticks.
    pub watcher_interval: Duration,
    /// Grace period before the first Watcher tick.
    pub watcher_startup_delay: Duration,
    /// Worker count for the Pool.
    pub max_concurrent: usize,
    /// Max concurrent AI/PDF ("heavy") jobs.
    pub heavy_job_limit: usize,
    /// Advisory only; not enforced by the Executor. See DESIGN.md.
    pub max_retries: u32,
    /// TTL for terminal jobs kept in the store.
    pub purge_after: Duration,
}

impl CollectorConfig {
    /// Load configuration from environment variables, falling back to the
    /// documented defaults for everything except `DATABASE_URL`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            enabled: env_bool("COLLECTOR_ENABLED", true)?,
            watcher_interval: Duration::from_secs(env_u64("COLLECTOR_WATCHER_INTERVAL_SECS", 60)?),
            watcher_startup_delay: Duration::from_secs(env_u64(
                "COLLECTOR_WATCHER_STARTUP_DELAY_SECS",
                10,
            )?),
            max_concurrent: env_u64("COLLECTOR_MAX_CONCURRENT", 5)? as usize,
            heavy_job_limit: env_u64("COLLECTOR_HEAVY_JOB_LIMIT", 1)? as usize,
            max_retries: env_u64("COLLECTOR_MAX_RETRIES", 3)? as u32,
            purge_after: Duration::from_secs(env_u64("COLLECTOR_PURGE_AFTER_SECS", 24 * 3600)?),
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().with_context(|| format!("{key} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(v) => v.parse::<bool>().with_context(|| format!("{key} must be true or false")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_to_default() {
        std::env::remove_var("COLLECTOR_TEST_MISSING_KEY");
        assert_eq!(env_u64("COLLECTOR_TEST_MISSING_KEY", 42).unwrap(), 42);
    }

    #[test]
    fn env_bool_parses_explicit_value() {
        std::env::set_var("COLLECTOR_TEST_BOOL_KEY", "false");
        assert!(!env_bool("COLLECTOR_TEST_BOOL_KEY", true).unwrap());
        std::env::remove_var("COLLECTOR_TEST_BOOL_KEY");
    }
}
