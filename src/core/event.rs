//! Scheduled event model and trigger-time arithmetic.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;
use crate::util::clock::to_unix_nanos;

/// Classification of a scheduled event.
///
/// The kind decides whether the offset passed to
/// [`EventScheduler::add_event`](crate::core::EventScheduler::add_event) is
/// added to or subtracted from the reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Fires `offset` after the reference time (e.g. a window opening).
    OpenAllow,
    /// Fires `offset` before the reference time.
    CloseProhibit,
    /// Fires `offset` before the reference time; stronger variant of close.
    ForceClose,
}

impl EventKind {
    /// Every kind, in code order.
    pub const ALL: [Self; 3] = [Self::OpenAllow, Self::CloseProhibit, Self::ForceClose];

    /// Stable numeric code (0, 1, 2).
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::OpenAllow => 0,
            Self::CloseProhibit => 1,
            Self::ForceClose => 2,
        }
    }

    /// Absolute trigger time for an event of this kind.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Validation { field: "offset" }` when the result overflows
    /// the clock or falls outside the persistable range (the Unix epoch up to
    /// `u64::MAX` nanoseconds after it).
    pub fn trigger_time(
        self,
        reference: SystemTime,
        offset: Duration,
    ) -> Result<SystemTime, SchedulerError> {
        let computed = match self {
            Self::OpenAllow => reference.checked_add(offset),
            Self::CloseProhibit | Self::ForceClose => reference.checked_sub(offset),
        };
        let Some(at) = computed else {
            return Err(SchedulerError::validation(
                "offset",
                format!("{offset:?} is out of range for the reference time"),
            ));
        };
        if to_unix_nanos(at).is_none() {
            return Err(SchedulerError::validation(
                "offset",
                format!("{offset:?} moves the trigger time outside the persistable range"),
            ));
        }
        Ok(at)
    }
}

impl TryFrom<i64> for EventKind {
    type Error = SchedulerError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::OpenAllow),
            1 => Ok(Self::CloseProhibit),
            2 => Ok(Self::ForceClose),
            other => Err(SchedulerError::validation(
                "kind",
                format!("unknown event kind code {other}"),
            )),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAllow => write!(f, "open_allow"),
            Self::CloseProhibit => write!(f, "close_prohibit"),
            Self::ForceClose => write!(f, "force_close"),
        }
    }
}

/// Dedup identity of a pending event: the (key, kind, trigger time) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventId {
    /// Caller-chosen event key.
    pub key: String,
    /// Event kind.
    pub kind: EventKind,
    /// Absolute trigger time.
    pub trigger_time: SystemTime,
}

/// A pending timer entry owned by the [`TimerQueue`](crate::core::TimerQueue).
///
/// `trigger_time` is the computed instant and part of the dedup identity.
/// `fire_at` is when the queue actually releases the event; it only differs
/// from `trigger_time` for catch-up events whose trigger time had already
/// passed when they were added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// Computed trigger instant.
    pub trigger_time: SystemTime,
    /// Instant the heap orders by and the event loop fires at.
    pub fire_at: SystemTime,
    /// Caller-chosen event key.
    pub key: String,
    /// Event kind.
    pub kind: EventKind,
    /// Position in the heap while queued; `None` once popped.
    pub(crate) heap_index: Option<usize>,
}

impl ScheduledEvent {
    /// Create an event that is not yet queued, firing at its trigger time.
    pub fn new(key: impl Into<String>, kind: EventKind, trigger_time: SystemTime) -> Self {
        Self {
            trigger_time,
            fire_at: trigger_time,
            key: key.into(),
            kind,
            heap_index: None,
        }
    }

    /// Fire at `at` instead of the trigger time. The identity is unchanged.
    #[must_use]
    pub fn firing_at(mut self, at: SystemTime) -> Self {
        self.fire_at = at;
        self
    }

    /// Dedup identity of this event.
    #[must_use]
    pub fn id(&self) -> EventId {
        EventId {
            key: self.key.clone(),
            kind: self.kind,
            trigger_time: self.trigger_time,
        }
    }

    /// Position in the heap, or `None` if the event is not queued.
    #[must_use]
    pub const fn heap_index(&self) -> Option<usize> {
        self.heap_index
    }

    /// Whether the event is due to fire at `now`.
    #[must_use]
    pub fn is_due(&self, now: SystemTime) -> bool {
        self.fire_at <= now
    }
}
