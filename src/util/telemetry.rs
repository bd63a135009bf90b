//! Telemetry helpers for structured logging of scheduler and retry activity.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "temporal_policy=info";

/// Initialize tracing with [`DEFAULT_LOG_FILTER`]. Users can install their own
/// subscriber; this helper does nothing if one is already set.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Initialize tracing, falling back to `default_filter` when `RUST_LOG` is unset.
///
/// Thread names are included so event-loop output (`temporal-event-loop`) is
/// distinguishable from caller threads.
pub fn init_tracing_with(default_filter: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
