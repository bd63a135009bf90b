//! Tests for error types

use std::error::Error as _;

use temporal_policy::core::{CancelPoint, RetryError, SchedulerError};

#[test]
fn test_capacity_exceeded_error() {
    let err = SchedulerError::CapacityExceeded { limit: 4092 };
    assert_eq!(format!("{err}"), "event queue size limit reached: 4092");
}

#[test]
fn test_validation_error() {
    let err = SchedulerError::Validation {
        field: "key",
        reason: "must not be empty".to_string(),
    };
    assert_eq!(format!("{err}"), "invalid key: must not be empty");
}

#[test]
fn test_io_error_keeps_source() {
    let err = SchedulerError::Io {
        path: "/tmp/events.json".into(),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
    };
    assert!(format!("{err}").contains("/tmp/events.json"));
    assert!(err.source().is_some());
}

#[test]
fn test_retry_error_display() {
    let cancelled: RetryError<std::io::Error> = RetryError::Cancelled {
        attempt: 2,
        during: CancelPoint::Backoff,
    };
    assert_eq!(
        format!("{cancelled}"),
        "cancelled during backoff sleep before attempt 2"
    );
    assert!(cancelled.is_cancelled());
    assert!(cancelled.into_source().is_none());

    let exhausted = RetryError::RetriesExhausted {
        attempts: 6,
        source: std::io::Error::other("timeout"),
    };
    assert_eq!(
        format!("{exhausted}"),
        "retries exhausted after 6 attempts: timeout"
    );
    assert!(!exhausted.is_cancelled());
    assert_eq!(exhausted.into_source().unwrap().to_string(), "timeout");
}
