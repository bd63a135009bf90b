//! Token bucket shared by concurrent retry runs.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct BucketState {
    tokens: f64,
    last: Instant,
}

/// Continuously refilling token bucket.
///
/// Starts full. Tokens accrue at `rate` per second up to `burst`. The lock is
/// only held for the arithmetic, never across an await.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("available", &self.state.lock().tokens)
            .finish()
    }
}

impl TokenBucket {
    /// Create a full bucket. A non-positive rate or a zero burst is raised to
    /// the smallest usable value.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            f64::MIN_POSITIVE
        };
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Refill rate in tokens per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity.
    #[must_use]
    pub const fn burst(&self) -> f64 {
        self.burst
    }

    /// Take one token if available.
    ///
    /// # Errors
    ///
    /// How long until the next token accrues.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = elapsed.mul_add(self.rate, state.tokens).min(self.burst);
        state.last = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        let secs = (1.0 - state.tokens) / self.rate;
        Err(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    /// Wait for a token.
    ///
    /// Returns `false` without taking a token if `cancel` fires first
    /// (including when it was already cancelled on entry).
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let wait = match self.try_acquire() {
                Ok(()) => return true,
                Err(wait) => wait,
            };
            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(wait) => {}
            }
        }
    }
}
