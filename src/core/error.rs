//! Error types for scheduler and retry operations.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the event scheduler and its snapshot persistence.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A caller-supplied argument was rejected. Not retried.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Name of the offending argument (`key`, `kind`, `offset`).
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
    /// The timer queue is at its hard cap; nothing was enqueued.
    #[error("event queue size limit reached: {limit}")]
    CapacityExceeded {
        /// Configured maximum number of pending events.
        limit: usize,
    },
    /// Reading or writing a snapshot file failed.
    #[error("snapshot I/O failed for {path:?}: {source}")]
    Io {
        /// Path that was being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A snapshot could not be serialized.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    /// A snapshot file exists but does not hold a valid event list.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),
    /// The event-loop thread could not be started.
    #[error("failed to spawn event loop thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl SchedulerError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The wait that was interrupted when a retry run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPoint {
    /// Waiting for a rate-limiter token.
    RateLimit,
    /// Sleeping between attempts.
    Backoff,
}

impl fmt::Display for CancelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate limit wait"),
            Self::Backoff => write!(f, "backoff sleep"),
        }
    }
}

/// Outcome of a failed retry run.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation returned an error the policy classified as non-retriable.
    #[error("operation failed with non-retriable error: {0}")]
    Operation(#[source] E),
    /// The cancellation token fired while waiting.
    #[error("cancelled during {during} before attempt {attempt}")]
    Cancelled {
        /// Attempt that was about to run (1-based).
        attempt: u32,
        /// Which wait was interrupted.
        during: CancelPoint,
    },
    /// Every attempt failed with a retriable error.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Error returned by the final attempt.
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Whether the run ended because of cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The last error returned by the operation, if one was observed.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Operation(e) | Self::RetriesExhausted { source: e, .. } => Some(e),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
