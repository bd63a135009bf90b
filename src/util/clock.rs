//! Wall-clock helpers for trigger times and snapshot timestamps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch for the current wall-clock time.
///
/// Returns 0 if the system clock reads earlier than the epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

/// Convert an instant to nanoseconds since the Unix epoch.
///
/// Returns `None` for instants before the epoch or beyond `u64` nanoseconds
/// (the year 2554).
#[must_use]
pub fn to_unix_nanos(at: SystemTime) -> Option<u64> {
    let since_epoch = at.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_nanos()).ok()
}

/// Convert nanoseconds since the Unix epoch back into an instant.
#[must_use]
pub fn from_unix_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

/// Time remaining until `at`, or zero if it has already passed.
#[must_use]
pub fn until(at: SystemTime) -> Duration {
    at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO)
}
