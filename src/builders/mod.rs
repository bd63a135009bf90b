//! Builders to construct engine components from configuration.

pub mod engine_builder;

pub use engine_builder::build_scheduler;
#[cfg(feature = "tokio-runtime")]
pub use engine_builder::{build_engine, build_retry_executor, build_retry_policy, Engine};
