//! Engine configuration: scheduler limits, persistence and retry policy values.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, MAX_EVENT_QUEUE_SIZE};

/// Prefix shared by every environment variable read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "TEMPORAL_";

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Hard cap on pending events.
    pub max_queue_size: usize,
    /// Capacity of the bounded wake-signal channel feeding the event loop.
    pub signal_capacity: usize,
    /// Delay before an already-elapsed event fires (catch-up), in milliseconds.
    pub catch_up_delay_ms: u64,
    /// Whether snapshot save/load touch the disk at all.
    pub persistence_enabled: bool,
    /// Snapshot file used by `checkpoint` / `restore`.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: MAX_EVENT_QUEUE_SIZE,
            signal_capacity: 1024,
            catch_up_delay_ms: 5_000,
            persistence_enabled: false,
            snapshot_path: None,
        }
    }
}

impl SchedulerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pending-event cap.
    #[must_use]
    pub const fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the wake-signal channel capacity.
    #[must_use]
    pub const fn with_signal_capacity(mut self, signal_capacity: usize) -> Self {
        self.signal_capacity = signal_capacity;
        self
    }

    /// Set the catch-up delay for already-elapsed events.
    #[must_use]
    pub fn with_catch_up_delay(mut self, delay: Duration) -> Self {
        self.catch_up_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable snapshot persistence.
    #[must_use]
    pub const fn with_persistence(mut self, enabled: bool) -> Self {
        self.persistence_enabled = enabled;
        self
    }

    /// Set the snapshot file used by `checkpoint` / `restore`.
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Catch-up delay as a `Duration`.
    #[must_use]
    pub const fn catch_up_delay(&self) -> Duration {
        Duration::from_millis(self.catch_up_delay_ms)
    }

    /// Validate scheduler configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than 0".into());
        }
        if self.signal_capacity == 0 {
            return Err("signal_capacity must be greater than 0".into());
        }
        if self
            .snapshot_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err("snapshot_path must not be empty".into());
        }
        Ok(())
    }
}

/// Retry policy values. Zero means "use the default" for every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Token refill rate, per second.
    pub rate_per_sec: f64,
    /// Token bucket capacity.
    pub burst: u32,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay, in milliseconds.
    pub initial_interval_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub max_interval_ms: u64,
    /// Backoff growth factor.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 1.0,
            burst: 2,
            max_retries: 5,
            initial_interval_ms: 500,
            max_interval_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Validate retry configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if !self.rate_per_sec.is_finite() || self.rate_per_sec < 0.0 {
            return Err("rate_per_sec must be a non-negative number".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err("multiplier must be a non-negative number".into());
        }
        if self.max_interval_ms != 0 && self.initial_interval_ms > self.max_interval_ms {
            return Err("initial_interval_ms must not exceed max_interval_ms".into());
        }
        Ok(())
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler and persistence settings.
    pub scheduler: SchedulerConfig,
    /// Retry executor settings.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Validate both sections.
    ///
    /// # Errors
    ///
    /// Describes the first invalid field, prefixed with its section.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.retry
            .validate()
            .map_err(|e| format!("retry invalid: {e}"))?;
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure, as text.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `TEMPORAL_*` environment variables, loading a
    /// `.env` file first if one is present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a resulting configuration that fails
    /// validation.
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = ?path, "loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup, as `from_env` does.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let read = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(v) = parse_var(&read, "MAX_QUEUE_SIZE")? {
            cfg.scheduler.max_queue_size = v;
        }
        if let Some(v) = parse_var(&read, "SIGNAL_CAPACITY")? {
            cfg.scheduler.signal_capacity = v;
        }
        if let Some(v) = parse_var(&read, "CATCH_UP_DELAY_MS")? {
            cfg.scheduler.catch_up_delay_ms = v;
        }
        if let Some(v) = parse_var(&read, "PERSISTENCE_ENABLED")? {
            cfg.scheduler.persistence_enabled = v;
        }
        if let Some(v) = read("SNAPSHOT_PATH").filter(|v| !v.is_empty()) {
            cfg.scheduler.snapshot_path = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_var(&read, "RETRY_RATE")? {
            cfg.retry.rate_per_sec = v;
        }
        if let Some(v) = parse_var(&read, "RETRY_BURST")? {
            cfg.retry.burst = v;
        }
        if let Some(v) = parse_var(&read, "RETRY_MAX_RETRIES")? {
            cfg.retry.max_retries = v;
        }
        if let Some(v) = parse_var(&read, "RETRY_INITIAL_INTERVAL_MS")? {
            cfg.retry.initial_interval_ms = v;
        }
        if let Some(v) = parse_var(&read, "RETRY_MAX_INTERVAL_MS")? {
            cfg.retry.max_interval_ms = v;
        }
        if let Some(v) = parse_var(&read, "RETRY_MULTIPLIER")? {
            cfg.retry.multiplier = v;
        }

        cfg.validate().map_err(|e| anyhow!(e))?;
        Ok(cfg)
    }
}

fn parse_var<T, R>(read: &R, suffix: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    R: Fn(&str) -> Option<String>,
{
    let Some(raw) = read(suffix) else {
        return Ok(None);
    };
    let raw = raw.trim();
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| anyhow!("{ENV_PREFIX}{suffix}={raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.scheduler.max_queue_size, 4092);
        assert_eq!(cfg.scheduler.catch_up_delay(), Duration::from_secs(5));
        assert!(!cfg.scheduler.persistence_enabled);
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.burst, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TEMPORAL_MAX_QUEUE_SIZE", "16"),
            ("TEMPORAL_PERSISTENCE_ENABLED", "true"),
            ("TEMPORAL_SNAPSHOT_PATH", "/tmp/events.json"),
            ("TEMPORAL_RETRY_MULTIPLIER", " 3.5 "),
        ]
        .into_iter()
        .collect();

        let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.scheduler.max_queue_size, 16);
        assert!(cfg.scheduler.persistence_enabled);
        assert_eq!(cfg.scheduler.snapshot_path, Some(PathBuf::from("/tmp/events.json")));
        assert!((cfg.retry.multiplier - 3.5).abs() < f64::EPSILON);
        assert_eq!(cfg.retry.max_retries, 5);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = EngineConfig::from_lookup(|k| {
            (k == "TEMPORAL_RETRY_BURST").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("TEMPORAL_RETRY_BURST"));
    }

    #[test]
    fn test_from_lookup_validates_result() {
        let err = EngineConfig::from_lookup(|k| {
            (k == "TEMPORAL_MAX_QUEUE_SIZE").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("max_queue_size"));
    }
}
