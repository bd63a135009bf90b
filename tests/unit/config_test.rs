//! Tests for configuration validation

use std::time::Duration;

use temporal_policy::config::{EngineConfig, RetryConfig, SchedulerConfig};

#[test]
fn test_scheduler_config_validation() {
    assert!(SchedulerConfig::default().validate().is_ok());
    assert!(SchedulerConfig::default()
        .with_max_queue_size(0)
        .validate()
        .is_err());
    assert!(SchedulerConfig::default()
        .with_signal_capacity(0)
        .validate()
        .is_err());
    assert!(SchedulerConfig::default()
        .with_snapshot_path("")
        .validate()
        .is_err());
}

#[test]
fn test_scheduler_config_builders() {
    let cfg = SchedulerConfig::new()
        .with_max_queue_size(10)
        .with_catch_up_delay(Duration::from_millis(250))
        .with_persistence(true)
        .with_snapshot_path("/var/lib/temporal/events.json");
    assert_eq!(cfg.max_queue_size, 10);
    assert_eq!(cfg.catch_up_delay(), Duration::from_millis(250));
    assert!(cfg.persistence_enabled);
}

#[test]
fn test_retry_config_validation() {
    assert!(RetryConfig::default().validate().is_ok());

    let negative_rate = RetryConfig {
        rate_per_sec: -1.0,
        ..RetryConfig::default()
    };
    assert!(negative_rate.validate().is_err());

    let inverted = RetryConfig {
        initial_interval_ms: 5_000,
        max_interval_ms: 1_000,
        ..RetryConfig::default()
    };
    assert!(inverted.validate().is_err());
}

#[test]
fn test_engine_config_from_json() {
    let cfg = EngineConfig::from_json_str(
        r#"{
            "scheduler": { "max_queue_size": 128, "persistence_enabled": true },
            "retry": { "max_retries": 3, "multiplier": 1.5 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.scheduler.max_queue_size, 128);
    assert!(cfg.scheduler.persistence_enabled);
    // Unspecified fields keep their defaults.
    assert_eq!(cfg.scheduler.catch_up_delay_ms, 5_000);
    assert_eq!(cfg.retry.max_retries, 3);
    assert_eq!(cfg.retry.burst, 2);
}

#[test]
fn test_engine_config_from_json_rejects_invalid() {
    let err = EngineConfig::from_json_str(r#"{ "scheduler": { "max_queue_size": 0 } }"#)
        .unwrap_err();
    assert!(err.contains("scheduler invalid"));
    assert!(EngineConfig::from_json_str("not json").is_err());
}
