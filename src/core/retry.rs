//! Rate-limited retry executor with capped exponential backoff.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::core::{CancelPoint, RetryError, TokenBucket};

const DEFAULT_RATE: f64 = 1.0;
const DEFAULT_BURST: u32 = 2;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Predicate deciding whether an operation error is worth another attempt.
pub type RetryClassifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync + 'static>;

/// Immutable retry policy.
///
/// Every setter replaces a zero (or non-finite) value with the default:
/// 1 token/s, burst 2, 5 retries, 500 ms initial interval, 2 s ceiling,
/// multiplier 2.0, and every error retriable.
pub struct RetryPolicy<E> {
    rate: f64,
    burst: u32,
    max_retries: u32,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    // None retries every error.
    is_retriable: Option<RetryClassifier<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            rate: self.rate,
            burst: self.burst,
            max_retries: self.max_retries,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            is_retriable: self.is_retriable.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("max_retries", &self.max_retries)
            .field("initial_interval", &self.initial_interval)
            .field("max_interval", &self.max_interval)
            .field("multiplier", &self.multiplier)
            .field("classifier", &self.is_retriable.is_some())
            .finish()
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            burst: DEFAULT_BURST,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            is_retriable: None,
        }
    }
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        default
    }
}

fn non_zero_or<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() {
        default
    } else {
        value
    }
}

impl<E> RetryPolicy<E> {
    /// Policy with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy from configuration values, zeros replaced by defaults.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::default()
            .with_rate(config.rate_per_sec)
            .with_burst(config.burst)
            .with_max_retries(config.max_retries)
            .with_initial_interval(Duration::from_millis(config.initial_interval_ms))
            .with_max_interval(Duration::from_millis(config.max_interval_ms))
            .with_multiplier(config.multiplier)
    }

    /// Token refill rate per second.
    #[must_use]
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = positive_or(rate, DEFAULT_RATE);
        self
    }

    /// Token bucket capacity.
    #[must_use]
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = non_zero_or(burst, DEFAULT_BURST);
        self
    }

    /// Retries after the first attempt. Zero selects the default.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = non_zero_or(max_retries, DEFAULT_MAX_RETRIES);
        self
    }

    /// Delay before the second attempt.
    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = non_zero_or(interval, DEFAULT_INITIAL_INTERVAL);
        self
    }

    /// Ceiling for any single backoff delay.
    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = non_zero_or(interval, DEFAULT_MAX_INTERVAL);
        self
    }

    /// Growth factor applied per attempt.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = positive_or(multiplier, DEFAULT_MULTIPLIER);
        self
    }

    /// Classify which errors are retried.
    #[must_use]
    pub fn with_classifier<F>(mut self, is_retriable: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retriable = Some(Arc::new(is_retriable));
        self
    }

    /// Token refill rate per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Token bucket capacity.
    #[must_use]
    pub const fn burst(&self) -> u32 {
        self.burst
    }

    /// Retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Attempts including the first one.
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether `err` is worth another attempt.
    pub fn is_retriable(&self, err: &E) -> bool {
        self.is_retriable.as_ref().is_none_or(|classify| classify(err))
    }

    /// Delay after failed attempt `attempt` (1-based), before the next one:
    /// `min(initial * multiplier^(attempt - 1), max)`, computed step by step.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let mut delay = self.initial_interval;
        for _ in 1..attempt {
            if delay >= self.max_interval {
                break;
            }
            delay = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
                .unwrap_or(Duration::MAX);
        }
        delay.min(self.max_interval)
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// Every attempt first takes a token from a bucket shared by all runs on this
/// executor, so concurrent callers are rate limited together. Token waits and
/// backoff sleeps both end promptly when the caller's token is cancelled.
pub struct RetryExecutor<E> {
    policy: RetryPolicy<E>,
    limiter: TokenBucket,
}

impl<E> fmt::Debug for RetryExecutor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl<E: fmt::Display> Default for RetryExecutor<E> {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<E: fmt::Display> RetryExecutor<E> {
    /// Create an executor with a full token bucket.
    #[must_use]
    pub fn new(policy: RetryPolicy<E>) -> Self {
        let limiter = TokenBucket::new(policy.rate, policy.burst);
        Self { policy, limiter }
    }

    /// Policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    /// Run `op` until it succeeds, fails with a non-retriable error, runs out
    /// of attempts, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// - `RetryError::Operation` for an error the classifier rejected.
    /// - `RetryError::Cancelled` if `cancel` fired during a token wait or a
    ///   backoff sleep.
    /// - `RetryError::RetriesExhausted` with the last error once every attempt
    ///   failed.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total = self.policy.total_attempts();
        let mut attempt = 1;
        loop {
            if !self.limiter.acquire(cancel).await {
                debug!(attempt, "retry run cancelled while rate limited");
                return Err(RetryError::Cancelled {
                    attempt,
                    during: CancelPoint::RateLimit,
                });
            }

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.policy.is_retriable(&err) {
                debug!(attempt, error = %err, "non-retriable error");
                return Err(RetryError::Operation(err));
            }
            if attempt >= total {
                warn!(attempts = attempt, error = %err, "retries exhausted");
                return Err(RetryError::RetriesExhausted {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.policy.backoff(attempt);
            debug!(attempt, delay = ?delay, error = %err, "retriable error, backing off");
            drop(err);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempt = attempt + 1, "retry run cancelled during backoff");
                    return Err(RetryError::Cancelled {
                        attempt: attempt + 1,
                        during: CancelPoint::Backoff,
                    });
                }
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Like [`execute`](Self::execute), passing a fresh clone of `args` to
    /// every attempt.
    ///
    /// # Errors
    ///
    /// See [`RetryExecutor::execute`].
    pub async fn execute_with<A, T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        args: A,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        A: Clone,
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute(cancel, move || op(args.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::<String>::default();
        let delays: Vec<_> = (1..=5).map(|a| policy.backoff(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(2),
            ]
        );
        assert_eq!(policy.backoff(0), Duration::ZERO);
    }

    #[test]
    fn test_backoff_survives_huge_multiplier() {
        let policy = RetryPolicy::<String>::default().with_multiplier(1e300);
        assert_eq!(policy.backoff(40), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_values_take_defaults() {
        let policy = RetryPolicy::<String>::from_config(&RetryConfig {
            rate_per_sec: 0.0,
            burst: 0,
            max_retries: 0,
            initial_interval_ms: 0,
            max_interval_ms: 0,
            multiplier: 0.0,
        });
        assert!((policy.rate() - 1.0).abs() < f64::EPSILON);
        assert_eq!(policy.burst(), 2);
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.total_attempts(), 6);
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
    }

    #[test]
    fn test_classifier() {
        let policy = RetryPolicy::<String>::new().with_classifier(|e: &String| e != "fatal");
        assert!(policy.is_retriable(&"timeout".to_string()));
        assert!(!policy.is_retriable(&"fatal".to_string()));
    }
}
