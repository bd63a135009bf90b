//! Infrastructure adapters for durable scheduler state.

pub mod snapshot;

pub use snapshot::{EventRecord, SnapshotStore};
