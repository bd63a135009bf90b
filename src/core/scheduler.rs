//! Timer-queue scheduler with a dedicated event-loop thread.
//!
//! Producers call [`EventScheduler::add_event`]; the event is validated,
//! deduplicated, pushed into the [`TimerQueue`] and the loop is woken through a
//! bounded signal channel. The loop drains every due event into a batch, arms
//! its wake timer for the next deadline, fires the batch in trigger order and
//! then blocks on stop / signal / timer.
//!
//! # Locking
//!
//! - `state` (`RwLock`) guards the queue, the running flag and the loop handles.
//! - `callbacks` (`RwLock`) guards the registry, separately from the queue.
//! - `dispatch` (`ReentrantMutex`) serializes callback firing. It is taken
//!   before a batch is popped, so batches fired by the loop, `stop`,
//!   `clean_expired_events` and `load_events` never interleave and stay in
//!   ascending trigger order.
//!
//! Neither `state` nor `callbacks` is held while a callback runs, so callbacks
//! may call back into the scheduler.

use std::cell::Cell;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::core::{
    CallbackRegistry, EventCallback, EventId, EventKind, ScheduledEvent, SchedulerError,
    TimerQueue,
};
use crate::infra::{EventRecord, SnapshotStore};
use crate::util::clock::until;

const LOOP_THREAD_NAME: &str = "temporal-event-loop";

thread_local! {
    /// Number of dispatch guards held by the current thread.
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Outcome of [`EventScheduler::load_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Future events pushed back into the queue.
    pub restored: usize,
    /// Elapsed events whose callbacks fired during the load.
    pub fired: usize,
    /// Records identical to an event that was already queued.
    pub skipped_duplicates: usize,
}

/// Mutable scheduler state guarded by the main lock.
struct EngineState {
    running: bool,
    queue: TimerQueue,
    signal_tx: Option<Sender<ScheduledEvent>>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    config: SchedulerConfig,
    state: RwLock<EngineState>,
    callbacks: RwLock<CallbackRegistry>,
    dispatch: ReentrantMutex<()>,
}

enum Tick {
    /// This loop's stop channel has been closed.
    Stopped,
    /// Earliest remaining trigger time, if any.
    Next(Option<SystemTime>),
}

struct DispatchGuard<'a> {
    _lock: ReentrantMutexGuard<'a, ()>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn in_dispatch() -> bool {
    DISPATCH_DEPTH.with(|d| d.get() > 0)
}

fn is_stopped(stop_rx: &Receiver<()>) -> bool {
    matches!(stop_rx.try_recv(), Err(TryRecvError::Disconnected))
}

impl Inner {
    fn dispatch(&self) -> DispatchGuard<'_> {
        let lock = self.dispatch.lock();
        DISPATCH_DEPTH.with(|d| d.set(d.get() + 1));
        DispatchGuard { _lock: lock }
    }

    /// Invoke the callback registered for (key, kind), if any.
    ///
    /// Unregistered pairs are expected (e.g. the owner went away) and are not
    /// an error.
    fn fire_callbacks(&self, key: &str, kind: EventKind) -> bool {
        let callback = self.callbacks.read().get(key, kind);
        let Some(callback) = callback else {
            trace!(key = %key, kind = %kind, "no callback registered, skipping");
            return false;
        };
        callback(kind);
        debug!(key = %key, kind = %kind, "callback fired");
        true
    }

    fn fire_batch(&self, batch: &[ScheduledEvent]) {
        for event in batch {
            self.fire_callbacks(&event.key, event.kind);
        }
    }

    /// One loop iteration: pop due events, note the next deadline, fire.
    fn fire_due(&self, stop_rx: &Receiver<()>) -> Tick {
        let _dispatch = self.dispatch();
        if is_stopped(stop_rx) {
            return Tick::Stopped;
        }
        let (batch, next) = {
            let mut state = self.state.write();
            let batch = state.queue.pop_due(SystemTime::now());
            let next = state.queue.peek_min().map(|e| e.fire_at);
            (batch, next)
        };
        if !batch.is_empty() {
            debug!(events = batch.len(), "firing due batch");
        }
        self.fire_batch(&batch);
        Tick::Next(next)
    }

    fn drain_and_fire(&self) -> usize {
        let _dispatch = self.dispatch();
        let batch = self.state.write().queue.drain_ordered();
        self.fire_batch(&batch);
        batch.len()
    }
}

fn event_loop(inner: &Inner, signal_rx: &Receiver<ScheduledEvent>, stop_rx: &Receiver<()>) {
    debug!("event loop started");
    loop {
        let Tick::Next(next) = inner.fire_due(stop_rx) else {
            break;
        };
        let timer = match next {
            Some(at) => {
                trace!(due_in = ?until(at), "wake timer armed");
                crossbeam_channel::at(Instant::now() + until(at))
            }
            None => crossbeam_channel::never(),
        };

        select! {
            recv(stop_rx) -> _ => break,
            recv(signal_rx) -> msg => match msg {
                // The queue is authoritative; the next iteration re-arms for it.
                Ok(event) => trace!(key = %event.key, kind = %event.kind, "wake signal"),
                Err(_) => break,
            },
            recv(timer) -> _ => {}
        }
    }
    debug!("event loop exited");
}

/// Scheduler that fires registered callbacks at absolute trigger times.
///
/// Construct one explicitly and share it (e.g. behind an `Arc`) with every
/// producer; there is no process-wide instance.
///
/// ```
/// use std::sync::Arc;
/// use std::time::{Duration, SystemTime};
/// use temporal_policy::config::SchedulerConfig;
/// use temporal_policy::core::{EventKind, EventScheduler};
///
/// let scheduler = EventScheduler::new(SchedulerConfig::default());
/// scheduler.start().unwrap();
/// scheduler
///     .add_event(
///         "sym1",
///         EventKind::OpenAllow,
///         SystemTime::now(),
///         Duration::from_secs(60),
///         Some(Arc::new(|kind: EventKind| println!("{kind} fired"))),
///     )
///     .unwrap();
/// assert_eq!(scheduler.len(), 1);
/// scheduler.stop(); // fires the pending event
/// assert!(scheduler.is_empty());
/// ```
pub struct EventScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("EventScheduler")
            .field("running", &state.running)
            .field("pending", &state.queue.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl EventScheduler {
    /// Create a stopped scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let queue = TimerQueue::new(config.max_queue_size);
        Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(EngineState {
                    running: false,
                    queue,
                    signal_tx: None,
                    stop_tx: None,
                    worker: None,
                }),
                callbacks: RwLock::new(CallbackRegistry::new()),
                dispatch: ReentrantMutex::new(()),
            }),
        }
    }

    /// Configuration this scheduler was built with.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Start the event loop. No-op if it is already running.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Spawn` if the loop thread cannot be created.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.write();
        if state.running {
            return Ok(());
        }

        let (signal_tx, signal_rx) = bounded(self.inner.config.signal_capacity);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let inner = Arc::clone(&self.inner);
        let worker = thread::Builder::new()
            .name(LOOP_THREAD_NAME.into())
            .spawn(move || event_loop(&inner, &signal_rx, &stop_rx))
            .map_err(SchedulerError::Spawn)?;

        state.running = true;
        state.signal_tx = Some(signal_tx);
        state.stop_tx = Some(stop_tx);
        state.worker = Some(worker);
        info!(
            pending = state.queue.len(),
            max_queue_size = self.inner.config.max_queue_size,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop the event loop, then fire every pending event, earliest first.
    ///
    /// No-op if the scheduler is not running. The loop thread is joined unless
    /// `stop` is called from inside a callback.
    pub fn stop(&self) {
        let worker = {
            let mut state = self.inner.state.write();
            if !state.running {
                return;
            }
            state.running = false;
            state.signal_tx = None;
            state.stop_tx = None;
            state.worker.take()
        };

        let fired = self.inner.drain_and_fire();

        if let Some(worker) = worker {
            if in_dispatch() {
                debug!("stop called from a callback, event loop left to exit on its own");
            } else if worker.join().is_err() {
                warn!("event loop thread panicked");
            }
        }
        info!(fired, "scheduler stopped");
    }

    /// Whether the event loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.read().running
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.read().queue.len()
    }

    /// Whether no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.read().queue.is_empty()
    }

    /// Pending events, earliest first.
    #[must_use]
    pub fn pending_events(&self) -> Vec<ScheduledEvent> {
        self.inner.state.read().queue.snapshot()
    }

    /// Schedule an event and optionally (re)register its callback.
    ///
    /// The trigger time is `reference + offset` for [`EventKind::OpenAllow`]
    /// and `reference - offset` for the closing kinds. An event whose trigger
    /// time has already passed keeps that trigger time as its identity but
    /// fires after the configured catch-up delay. A callback, when given,
    /// replaces any previous callback for (key, kind) even if the enqueue is
    /// then rejected.
    ///
    /// Returns `Ok(false)` when an identical (key, kind, trigger time) event
    /// is already pending.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Validation` for an empty key or an out-of-range offset.
    /// - `SchedulerError::CapacityExceeded` when the queue is full.
    pub fn add_event(
        &self,
        key: &str,
        kind: EventKind,
        reference: SystemTime,
        offset: Duration,
        callback: Option<EventCallback>,
    ) -> Result<bool, SchedulerError> {
        if key.is_empty() {
            return Err(SchedulerError::validation("key", "must not be empty"));
        }
        let trigger_time = kind.trigger_time(reference, offset)?;

        if let Some(callback) = callback {
            self.inner.callbacks.write().register(key, kind, callback);
        }

        let mut event = ScheduledEvent::new(key, kind, trigger_time);
        let now = SystemTime::now();
        if trigger_time <= now {
            let delay = self.inner.config.catch_up_delay();
            debug!(key = %key, kind = %kind, delay = ?delay, "event already elapsed, scheduling catch-up");
            event = event.firing_at(now + delay);
        }

        let mut state = self.inner.state.write();
        if !state.queue.push(event.clone())? {
            trace!(key = %key, kind = %kind, "duplicate event ignored");
            return Ok(false);
        }
        if let Some(signal_tx) = state.signal_tx.as_ref() {
            match signal_tx.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => {
                    // Undelivered signals guarantee the loop wakes and re-reads the queue.
                    debug!(key = %key, "wake channel full, event left for the next loop wake");
                }
            }
        }
        Ok(true)
    }

    /// Register (or replace) the callback for (key, kind) without scheduling.
    pub fn register_callback(
        &self,
        key: impl Into<String>,
        kind: EventKind,
        callback: EventCallback,
    ) -> Option<EventCallback> {
        self.inner.callbacks.write().register(key, kind, callback)
    }

    /// Remove every callback registered under `key`. Its pending events still
    /// fire, as silent no-ops.
    pub fn unregister_callbacks(&self, key: &str) -> usize {
        self.inner.callbacks.write().unregister_key(key)
    }

    /// Remove a pending event without firing it. Returns whether it was queued.
    ///
    /// `trigger_time` is the computed trigger time, also for catch-up events.
    pub fn cancel_event(&self, key: &str, kind: EventKind, trigger_time: SystemTime) -> bool {
        let id = EventId {
            key: key.to_string(),
            kind,
            trigger_time,
        };
        self.inner.state.write().queue.remove(&id).is_some()
    }

    /// Fire every event whose trigger time has passed, earliest first, leaving
    /// future events queued. Returns how many events were popped.
    pub fn clean_expired_events(&self) -> usize {
        let _dispatch = self.inner.dispatch();
        let batch = self.inner.state.write().queue.pop_due(SystemTime::now());
        self.inner.fire_batch(&batch);
        if !batch.is_empty() {
            debug!(events = batch.len(), "expired events cleaned");
        }
        batch.len()
    }

    /// Write all pending events to `path` (temp file + atomic rename).
    ///
    /// Returns the number of events written; 0 without touching the disk when
    /// persistence is disabled.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Encode` or `SchedulerError::Io`.
    pub fn save_events(&self, path: impl AsRef<Path>) -> Result<usize, SchedulerError> {
        if !self.inner.config.persistence_enabled {
            trace!("persistence disabled, save skipped");
            return Ok(0);
        }
        let store = SnapshotStore::new(path);
        let state = self.inner.state.read();
        let records: Vec<EventRecord> = state
            .queue
            .snapshot()
            .iter()
            .filter_map(EventRecord::from_event)
            .collect();
        store.write(&records)?;
        info!(path = ?store.path(), events = records.len(), "events saved");
        Ok(records.len())
    }

    /// Restore events from `path`.
    ///
    /// Future events are queued again; elapsed ones fire immediately, earliest
    /// first, once the queue lock is released. A missing file counts as "no
    /// prior state". No-op when persistence is disabled.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Io` / `SchedulerError::Decode` for an unreadable or
    ///   malformed snapshot (nothing is loaded).
    /// - `SchedulerError::CapacityExceeded` if the queue filled up; events
    ///   that fit were queued and elapsed events were still fired.
    pub fn load_events(&self, path: impl AsRef<Path>) -> Result<LoadReport, SchedulerError> {
        let mut report = LoadReport::default();
        if !self.inner.config.persistence_enabled {
            trace!("persistence disabled, load skipped");
            return Ok(report);
        }
        let store = SnapshotStore::new(path);
        let Some(records) = store.read()? else {
            debug!(path = ?store.path(), "no snapshot found, starting empty");
            return Ok(report);
        };

        let _dispatch = self.inner.dispatch();
        let mut dropped = 0usize;
        let mut expired = Vec::new();
        {
            let mut state = self.inner.state.write();
            let now = SystemTime::now();
            for record in records {
                let event = record.into_event();
                if state.queue.contains(&event.id()) {
                    report.skipped_duplicates += 1;
                    continue;
                }
                if event.is_due(now) {
                    expired.push(event);
                    continue;
                }
                match state.queue.push(event) {
                    Ok(true) => report.restored += 1,
                    Ok(false) => report.skipped_duplicates += 1,
                    Err(_) => dropped += 1,
                }
            }
            if report.restored > 0 {
                if let (Some(signal_tx), Some(first)) =
                    (state.signal_tx.as_ref(), state.queue.peek_min())
                {
                    let _ = signal_tx.try_send(first.clone());
                }
            }
        }

        expired.sort_by_key(|e| e.trigger_time);
        self.inner.fire_batch(&expired);
        report.fired = expired.len();
        info!(
            path = ?store.path(),
            restored = report.restored,
            fired = report.fired,
            duplicates = report.skipped_duplicates,
            "events loaded"
        );

        if dropped > 0 {
            let limit = self.inner.config.max_queue_size;
            warn!(dropped, limit, "queue full while loading snapshot");
            return Err(SchedulerError::CapacityExceeded { limit });
        }
        Ok(report)
    }

    /// Save to the configured snapshot path. Returns 0 when none is configured.
    ///
    /// # Errors
    ///
    /// See [`EventScheduler::save_events`].
    pub fn checkpoint(&self) -> Result<usize, SchedulerError> {
        match self.inner.config.snapshot_path.as_deref() {
            Some(path) => self.save_events(path),
            None => Ok(0),
        }
    }

    /// Load from the configured snapshot path. Empty report when none is configured.
    ///
    /// # Errors
    ///
    /// See [`EventScheduler::load_events`].
    pub fn restore(&self) -> Result<LoadReport, SchedulerError> {
        match self.inner.config.snapshot_path.as_deref() {
            Some(path) => self.load_events(path),
            None => Ok(LoadReport::default()),
        }
    }
}

impl Drop for EventScheduler {
    fn drop(&mut self) {
        // Closing the channels lets the loop exit; pending events are not fired.
        let mut state = self.inner.state.write();
        if state.running {
            state.running = false;
            state.signal_tx = None;
            state.stop_tx = None;
            state.worker = None;
            debug!(
                pending = state.queue.len(),
                "scheduler dropped without stop, event loop detached"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> EventCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_: EventKind| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let scheduler = EventScheduler::new(SchedulerConfig::default());
        let err = scheduler
            .add_event("", EventKind::OpenAllow, SystemTime::now(), Duration::ZERO, None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Validation { field: "key", .. }));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_start_stop_are_idempotent() {
        let scheduler = EventScheduler::new(SchedulerConfig::default());
        scheduler.stop();
        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_restart_after_stop() {
        let hits = Arc::new(AtomicUsize::new(0));
        let scheduler = EventScheduler::new(SchedulerConfig::default());
        scheduler.start().unwrap();
        scheduler.stop();
        scheduler.start().unwrap();
        scheduler
            .add_event(
                "k",
                EventKind::OpenAllow,
                SystemTime::now(),
                Duration::from_secs(3600),
                Some(counting(&hits)),
            )
            .unwrap();
        scheduler.stop();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_can_reenter_scheduler() {
        let scheduler = Arc::new(EventScheduler::new(SchedulerConfig::default()));
        let hits = Arc::new(AtomicUsize::new(0));
        let reentrant = {
            let scheduler = Arc::clone(&scheduler);
            let hits = Arc::clone(&hits);
            Arc::new(move |_: EventKind| {
                hits.fetch_add(1, Ordering::SeqCst);
                let _ = scheduler.len();
                scheduler.clean_expired_events();
            }) as EventCallback
        };
        scheduler
            .add_event(
                "k",
                EventKind::OpenAllow,
                SystemTime::now(),
                Duration::from_secs(3600),
                Some(reentrant),
            )
            .unwrap();
        scheduler.start().unwrap();
        scheduler.stop();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_event() {
        let scheduler = EventScheduler::new(SchedulerConfig::default());
        let reference = SystemTime::now();
        let offset = Duration::from_secs(3600);
        scheduler
            .add_event("k", EventKind::OpenAllow, reference, offset, None)
            .unwrap();

        assert!(scheduler.cancel_event("k", EventKind::OpenAllow, reference + offset));
        assert!(!scheduler.cancel_event("k", EventKind::OpenAllow, reference + offset));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_elapsed_event_is_added_once() {
        let scheduler = EventScheduler::new(SchedulerConfig::default());
        let reference = SystemTime::now() - Duration::from_secs(60);
        let offset = Duration::from_secs(1);

        assert!(scheduler
            .add_event("sym1", EventKind::OpenAllow, reference, offset, None)
            .unwrap());
        thread::sleep(Duration::from_millis(2));
        assert!(!scheduler
            .add_event("sym1", EventKind::OpenAllow, reference, offset, None)
            .unwrap());
        assert_eq!(scheduler.len(), 1);

        let queued = &scheduler.pending_events()[0];
        assert_eq!(queued.trigger_time, reference + offset);
        assert!(queued.fire_at > SystemTime::now());

        // Cancelled by its computed trigger time, not the catch-up instant.
        assert!(scheduler.cancel_event("sym1", EventKind::OpenAllow, reference + offset));
        assert!(scheduler.is_empty());
    }
}
