//! # Temporal Policy
//!
//! Timing policy for trading-style workloads: fire callbacks at precise future
//! instants, and retry flaky operations under a rate limit and backoff.
//!
//! ## Event scheduler
//!
//! [`EventScheduler`](core::EventScheduler) keeps pending events in a bounded
//! min-heap keyed on trigger time and runs one dedicated event-loop thread
//! that fires due callbacks in ascending trigger order.
//!
//! - **Dedup**: an event is identified by (key, kind, trigger time); adding the
//!   same triple twice is a no-op.
//! - **Capacity**: the queue holds at most `max_queue_size` events (4092 by
//!   default); further adds fail with `CapacityExceeded`.
//! - **Catch-up**: an event whose trigger time already passed fires after a
//!   short catch-up delay instead of being dropped.
//! - **Persistence**: pending events can be saved to and restored from a JSON
//!   snapshot; elapsed events fire on restore.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::{Duration, SystemTime};
//! use temporal_policy::builders::build_scheduler;
//! use temporal_policy::config::SchedulerConfig;
//! use temporal_policy::core::EventKind;
//!
//! let scheduler = build_scheduler(&SchedulerConfig::default()).unwrap();
//! scheduler.start().unwrap();
//!
//! // Fires 30s before the session close.
//! let session_close = SystemTime::now() + Duration::from_secs(3600);
//! scheduler
//!     .add_event(
//!         "sym1",
//!         EventKind::CloseProhibit,
//!         session_close,
//!         Duration::from_secs(30),
//!         Some(Arc::new(|kind: EventKind| println!("sym1: {kind}"))),
//!     )
//!     .unwrap();
//!
//! scheduler.stop();
//! ```
//!
//! ## Retry executor
//!
//! [`RetryExecutor`](core::RetryExecutor) (feature `tokio-runtime`, on by
//! default) takes a token from a shared bucket before every attempt, backs off
//! exponentially between retriable failures and honours a
//! `CancellationToken` during both waits.
//!
//! ```rust,ignore
//! use temporal_policy::core::{RetryExecutor, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! let executor = RetryExecutor::new(RetryPolicy::new().with_max_retries(3));
//! let quote = executor
//!     .execute(&CancellationToken::new(), || fetch_quote("sym1"))
//!     .await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling primitives: events, timer queue, scheduler, retry.
pub mod core;
/// Configuration models for the scheduler and retry policy.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// Infrastructure adapters for snapshot storage.
pub mod infra;
/// Runtime adapters for handing callback work to an async runtime.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
