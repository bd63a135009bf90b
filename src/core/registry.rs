//! Callback registry keyed by (event key, event kind).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::EventKind;

/// Callback fired when a scheduled event comes due.
///
/// Callbacks run synchronously on the thread that fires them (normally the
/// event-loop thread) and must return quickly; long work should be handed off,
/// e.g. with [`TokioSpawner::handoff`](crate::runtime::TokioSpawner::handoff).
pub type EventCallback = Arc<dyn Fn(EventKind) + Send + Sync + 'static>;

/// One callback per (key, kind). Registering again replaces the previous one.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, HashMap<EventKind, EventCallback>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("keys", &self.callbacks.len())
            .field("callbacks", &self.len())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for (key, kind), returning the callback it replaced.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        kind: EventKind,
        callback: EventCallback,
    ) -> Option<EventCallback> {
        self.callbacks
            .entry(key.into())
            .or_default()
            .insert(kind, callback)
    }

    /// Remove the callback for (key, kind).
    pub fn unregister(&mut self, key: &str, kind: EventKind) -> Option<EventCallback> {
        let by_kind = self.callbacks.get_mut(key)?;
        let removed = by_kind.remove(&kind);
        if by_kind.is_empty() {
            self.callbacks.remove(key);
        }
        removed
    }

    /// Remove every callback registered under `key`. Returns how many were removed.
    pub fn unregister_key(&mut self, key: &str) -> usize {
        self.callbacks.remove(key).map_or(0, |by_kind| by_kind.len())
    }

    /// Look up the callback for (key, kind).
    #[must_use]
    pub fn get(&self, key: &str, kind: EventKind) -> Option<EventCallback> {
        self.callbacks.get(key)?.get(&kind).cloned()
    }

    /// Total number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.values().map(HashMap::len).sum()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
