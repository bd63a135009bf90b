//! Tests for builder modules

use temporal_policy::builders::{build_engine, build_retry_policy, build_scheduler};
use temporal_policy::config::{EngineConfig, RetryConfig, SchedulerConfig};
use temporal_policy::core::{RetryExecutor, SchedulerError};

#[test]
fn test_build_scheduler_validates() {
    let scheduler = build_scheduler(&SchedulerConfig::default().with_max_queue_size(8)).unwrap();
    assert_eq!(scheduler.config().max_queue_size, 8);
    assert!(!scheduler.is_running());

    let err = build_scheduler(&SchedulerConfig::default().with_max_queue_size(0)).unwrap_err();
    assert!(matches!(err, SchedulerError::Validation { field: "config", .. }));
}

#[test]
fn test_build_retry_policy_with_classifier() {
    let policy = build_retry_policy::<String>(&RetryConfig {
        max_retries: 2,
        ..RetryConfig::default()
    })
    .unwrap()
    .with_classifier(|e: &String| e.starts_with("transient"));

    assert_eq!(policy.total_attempts(), 3);
    assert!(policy.is_retriable(&"transient: reset".to_string()));
    assert!(!policy.is_retriable(&"rejected".to_string()));

    let executor = RetryExecutor::new(policy);
    assert_eq!(executor.policy().max_retries(), 2);
}

#[test]
fn test_build_engine() {
    let engine = build_engine::<String>(&EngineConfig::default()).unwrap();
    assert!(engine.scheduler.is_empty());
    assert_eq!(engine.retry.policy().burst(), 2);

    let mut bad = EngineConfig::default();
    bad.retry.multiplier = f64::NAN;
    assert!(build_engine::<String>(&bad).is_err());
}
