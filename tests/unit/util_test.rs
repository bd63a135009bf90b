//! Tests for utility functions

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use temporal_policy::util::clock::{from_unix_nanos, now_ms, to_unix_nanos, until};
use temporal_policy::util::telemetry::init_tracing;

#[test]
fn test_now_ms_tracks_system_time() {
    let expected = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    assert!(now_ms().abs_diff(expected) < 1_000);
}

#[test]
fn test_unix_nanos_conversions() {
    let at = UNIX_EPOCH + Duration::from_millis(1_735_689_600_000);
    assert_eq!(to_unix_nanos(at), Some(1_735_689_600_000_000_000));
    assert_eq!(from_unix_nanos(1_735_689_600_000_000_000), at);

    // Beyond u64 nanoseconds cannot be represented.
    assert_eq!(to_unix_nanos(UNIX_EPOCH + Duration::from_secs(20_000_000_000)), None);
}

#[test]
fn test_until_saturates_at_zero() {
    assert_eq!(until(SystemTime::now() - Duration::from_secs(1)), Duration::ZERO);
    assert!(until(SystemTime::now() + Duration::from_secs(60)) > Duration::from_secs(59));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
