//! Configuration models for the scheduler, persistence and retry policy.

pub mod engine;

pub use engine::{EngineConfig, RetryConfig, SchedulerConfig};
