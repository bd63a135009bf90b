//! Bounded min-heap of scheduled events ordered by fire time.
//!
//! The queue has no locking of its own; the scheduler serializes all access.
//! Each queued event records its current `heap_index`, and the identity map
//! mirrors it, both kept in step with every sift so an event can be found and
//! removed from the middle of the heap in O(log n).

use std::collections::HashMap;
use std::time::SystemTime;

use crate::core::{EventId, ScheduledEvent, SchedulerError};

/// Default hard cap on pending events.
pub const MAX_EVENT_QUEUE_SIZE: usize = 4092;

/// Binary min-heap keyed on `fire_at`, with O(1) duplicate detection on
/// (key, kind, trigger time).
///
/// Ties between equal fire times are broken arbitrarily.
#[derive(Debug)]
pub struct TimerQueue {
    max_size: usize,
    heap: Vec<ScheduledEvent>,
    // Identity -> current heap position.
    ids: HashMap<EventId, usize>,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new(MAX_EVENT_QUEUE_SIZE)
    }
}

impl TimerQueue {
    /// Create an empty queue holding at most `max_size` events.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            heap: Vec::with_capacity(max_size.min(1024)),
            ids: HashMap::with_capacity(max_size.min(1024)),
        }
    }

    /// Maximum number of pending events.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Current number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether the queue is at its cap.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.max_size
    }

    /// Whether an event with this identity is pending.
    #[must_use]
    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains_key(id)
    }

    /// Insert an event.
    ///
    /// Returns `Ok(false)` without modifying the queue when an event with the
    /// same (key, kind, trigger time) is already pending.
    ///
    /// # Errors
    ///
    /// `SchedulerError::CapacityExceeded` when the queue is full.
    pub fn push(&mut self, mut event: ScheduledEvent) -> Result<bool, SchedulerError> {
        let id = event.id();
        if self.ids.contains_key(&id) {
            return Ok(false);
        }
        if self.is_full() {
            return Err(SchedulerError::CapacityExceeded {
                limit: self.max_size,
            });
        }
        let idx = self.heap.len();
        event.heap_index = Some(idx);
        self.heap.push(event);
        self.ids.insert(id, idx);
        self.sift_up(idx);
        Ok(true)
    }

    /// Earliest pending event, without removing it.
    #[must_use]
    pub fn peek_min(&self) -> Option<&ScheduledEvent> {
        self.heap.first()
    }

    /// Remove and return the earliest pending event.
    pub fn pop_min(&mut self) -> Option<ScheduledEvent> {
        self.remove_at(0)
    }

    /// Remove a pending event by identity in O(log n). Returns it if it was queued.
    pub fn remove(&mut self, id: &EventId) -> Option<ScheduledEvent> {
        let idx = *self.ids.get(id)?;
        self.remove_at(idx)
    }

    /// Pop every event due at `now`, earliest first.
    pub fn pop_due(&mut self, now: SystemTime) -> Vec<ScheduledEvent> {
        let mut due = Vec::new();
        while self.peek_min().is_some_and(|e| e.is_due(now)) {
            if let Some(event) = self.pop_min() {
                due.push(event);
            }
        }
        due
    }

    /// Pop every pending event, earliest first.
    pub fn drain_ordered(&mut self) -> Vec<ScheduledEvent> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(event) = self.pop_min() {
            out.push(event);
        }
        out
    }

    /// Copy of all pending events in firing order. The queue is untouched.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ScheduledEvent> {
        let mut events = self.heap.clone();
        events.sort_by_key(|e| e.fire_at);
        events
    }

    /// Iterate pending events in heap (not firing) order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.heap.iter()
    }

    fn remove_at(&mut self, idx: usize) -> Option<ScheduledEvent> {
        let last = self.heap.len().checked_sub(1)?;
        if idx > last {
            return None;
        }
        if idx != last {
            self.swap(idx, last);
        }
        let mut event = self.heap.pop()?;
        event.heap_index = None;
        self.ids.remove(&event.id());
        if idx < self.heap.len() {
            // The element moved into `idx` may belong above or below it.
            if !self.sift_down(idx) {
                self.sift_up(idx);
            }
        }
        Some(event)
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.heap[a].fire_at < self.heap[b].fire_at
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        for idx in [a, b] {
            let event = &mut self.heap[idx];
            event.heap_index = Some(idx);
            if let Some(slot) = self.ids.get_mut(&event.id()) {
                *slot = idx;
            }
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    /// Returns true if the element moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.heap.len();
        let mut idx = start;
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, idx) {
                break;
            }
            self.swap(idx, child);
            idx = child;
        }
        idx > start
    }
}
