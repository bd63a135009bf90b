//! Core scheduling primitives: events, the timer queue, the scheduler and the
//! retry executor.

pub mod error;
pub mod event;
pub mod registry;
pub mod scheduler;
pub mod timer_queue;

#[cfg(feature = "tokio-runtime")]
pub mod limiter;
#[cfg(feature = "tokio-runtime")]
pub mod retry;

pub use error::{AppResult, CancelPoint, RetryError, SchedulerError};
pub use event::{EventId, EventKind, ScheduledEvent};
pub use registry::{CallbackRegistry, EventCallback};
pub use scheduler::{EventScheduler, LoadReport};
pub use timer_queue::{TimerQueue, MAX_EVENT_QUEUE_SIZE};

#[cfg(feature = "tokio-runtime")]
pub use limiter::TokenBucket;
#[cfg(feature = "tokio-runtime")]
pub use retry::{RetryClassifier, RetryExecutor, RetryPolicy};
