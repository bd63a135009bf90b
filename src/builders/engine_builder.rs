//! Builders that validate configuration before constructing components.

use crate::config::SchedulerConfig;
use crate::core::{EventScheduler, SchedulerError};

#[cfg(feature = "tokio-runtime")]
use crate::config::{EngineConfig, RetryConfig};
#[cfg(feature = "tokio-runtime")]
use crate::core::{RetryExecutor, RetryPolicy};

/// Build a stopped scheduler from validated configuration.
///
/// # Errors
///
/// `SchedulerError::Validation { field: "config" }` when the configuration is invalid.
pub fn build_scheduler(cfg: &SchedulerConfig) -> Result<EventScheduler, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::validation("config", format!("scheduler invalid: {e}")))?;
    Ok(EventScheduler::new(cfg.clone()))
}

/// Build a retry policy from validated configuration. Add a classifier
/// with [`RetryPolicy::with_classifier`]; by default every error is retried.
///
/// # Errors
///
/// `SchedulerError::Validation { field: "config" }` when the configuration is invalid.
#[cfg(feature = "tokio-runtime")]
pub fn build_retry_policy<E>(cfg: &RetryConfig) -> Result<RetryPolicy<E>, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::validation("config", format!("retry invalid: {e}")))?;
    Ok(RetryPolicy::from_config(cfg))
}

/// Build a retry executor that retries every error.
///
/// # Errors
///
/// See [`build_retry_policy`].
#[cfg(feature = "tokio-runtime")]
pub fn build_retry_executor<E: std::fmt::Display>(
    cfg: &RetryConfig,
) -> Result<RetryExecutor<E>, SchedulerError> {
    build_retry_policy(cfg).map(RetryExecutor::new)
}

/// Scheduler and retry executor built from one [`EngineConfig`].
#[cfg(feature = "tokio-runtime")]
#[derive(Debug)]
pub struct Engine<E> {
    /// Stopped event scheduler.
    pub scheduler: EventScheduler,
    /// Retry executor retrying every error.
    pub retry: RetryExecutor<E>,
}

/// Build both engine components.
///
/// # Errors
///
/// `SchedulerError::Validation { field: "config" }` when either section is invalid.
#[cfg(feature = "tokio-runtime")]
pub fn build_engine<E: std::fmt::Display>(cfg: &EngineConfig) -> Result<Engine<E>, SchedulerError> {
    let scheduler = build_scheduler(&cfg.scheduler)?;
    let retry = build_retry_executor(&cfg.retry)?;
    Ok(Engine { scheduler, retry })
}
