//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use tracing::trace;

use crate::core::{EventCallback, EventKind};
use crate::runtime::Spawn;

/// Tokio-based spawner that executes futures on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    // Keeps an owned runtime alive for as long as any clone exists.
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl TokioSpawner {
    /// Create a spawner from an existing runtime handle.
    #[must_use]
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            _runtime: None,
        }
    }

    /// Create a spawner owning a new multi-threaded runtime.
    ///
    /// # Errors
    ///
    /// The runtime could not be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("temporal-callback")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(runtime)),
        })
    }

    /// Wrap an async handler as an [`EventCallback`].
    ///
    /// The returned callback only spawns `handler(kind)` and returns, so the
    /// event loop is never blocked by the handler. Spawned handlers may run
    /// concurrently and complete out of trigger order.
    pub fn handoff<F, Fut>(&self, handler: F) -> EventCallback
    where
        F: Fn(EventKind) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let spawner = self.clone();
        Arc::new(move |kind: EventKind| {
            trace!(kind = %kind, "handing callback off to tokio");
            spawner.spawn(handler(kind));
        })
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
