//! Runtime adapters for moving callback work off the event-loop thread.

use std::future::Future;

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;

/// Abstraction for spawning work on an async runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
