//! Controller configuration
//!
//! Defaults match a production deployment: pending agents are re-checked
//! every five minutes, failed reconciliations retry from 5 ms up to five
//! minutes. Every value can be overridden through the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::queue::Backoff;

pub const ENV_FALLBACK_REQUEUE_SECS: &str = "ARK_FALLBACK_REQUEUE_SECS";
pub const ENV_WORKERS: &str = "ARK_WORKERS";
pub const ENV_BACKOFF_BASE_MS: &str = "ARK_BACKOFF_BASE_MS";
pub const ENV_BACKOFF_MAX_SECS: &str = "ARK_BACKOFF_MAX_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Re-check interval for agents left `Pending`.
    pub fallback_requeue: Duration,
    /// Number of concurrent reconciliations.
    pub workers: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fallback_requeue: Duration::from_secs(300),
            workers: 4,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    pub fn with_fallback_requeue(mut self, fallback_requeue: Duration) -> Self {
        self.fallback_requeue = fallback_requeue;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_base, self.backoff_max)
    }

    /// Defaults overridden by `ARK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`ControllerConfig::from_env`] but reading variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_FALLBACK_REQUEUE_SECS)? {
            config.fallback_requeue = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_var::<usize, _>(&lookup, ENV_WORKERS)? {
            config.workers = workers;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_BACKOFF_BASE_MS)? {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_BACKOFF_MAX_SECS)? {
            config.backoff_max = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.backoff_base > self.backoff_max {
            return Err(ConfigError::BackoffRange {
                base: self.backoff_base,
                max: self.backoff_max,
            });
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<T>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidEnv {
            var,
            value: raw.clone(),
            reason: err.to_string(),
        })
}
