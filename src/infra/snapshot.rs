//! File-backed snapshots of the pending event queue.
//!
//! A snapshot is a JSON array of `{trigger_time, key, kind}` records, with
//! `trigger_time` in nanoseconds since the Unix epoch, so a reloaded event has
//! exactly the identity it was saved with. Heap positions and catch-up fire
//! instants are not stored; re-inserting the records rebuilds heap order. Writes go to a
//! temporary file in the target directory that is then renamed over the
//! target, so readers never observe a partial snapshot.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{EventKind, ScheduledEvent, SchedulerError};
use crate::util::clock::{from_unix_nanos, to_unix_nanos};

/// Persisted form of a pending event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Trigger time in nanoseconds since the Unix epoch.
    pub trigger_time: u64,
    /// Event key.
    pub key: String,
    /// Event kind.
    pub kind: EventKind,
}

impl EventRecord {
    /// Build a record from a queued event. Returns `None` for times outside
    /// the persistable range.
    #[must_use]
    pub fn from_event(event: &ScheduledEvent) -> Option<Self> {
        Some(Self {
            trigger_time: to_unix_nanos(event.trigger_time)?,
            key: event.key.clone(),
            kind: event.kind,
        })
    }

    /// Turn the record back into an unqueued event.
    #[must_use]
    pub fn into_event(self) -> ScheduledEvent {
        ScheduledEvent::new(self.key, self.kind, from_unix_nanos(self.trigger_time))
    }
}

/// Snapshot file at a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store for `path`. Nothing is touched on disk until a write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Target path of the snapshot.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> Result<PathBuf, SchedulerError> {
        let Some(name) = self.path.file_name() else {
            return Err(SchedulerError::io(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "snapshot path has no file name"),
            ));
        };
        let mut tmp_name = name.to_os_string();
        tmp_name.push(".tmp");
        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replace the snapshot with `records`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Encode` if serialization fails, `SchedulerError::Io` if
    /// the temporary file cannot be written or renamed.
    pub fn write(&self, records: &[EventRecord]) -> Result<(), SchedulerError> {
        let data = serde_json::to_vec(records).map_err(SchedulerError::Encode)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| SchedulerError::io(dir, e))?;
        }

        let tmp = self.temp_path()?;
        let mut file = File::create(&tmp).map_err(|e| SchedulerError::io(&tmp, e))?;
        file.write_all(&data)
            .and_then(|()| file.sync_all())
            .map_err(|e| SchedulerError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| SchedulerError::io(&self.path, e))?;
        tracing::debug!(path = ?self.path, events = records.len(), "snapshot written");
        Ok(())
    }

    /// Read the snapshot. A missing file yields `Ok(None)` ("no prior state").
    ///
    /// # Errors
    ///
    /// `SchedulerError::Io` if the file exists but cannot be read,
    /// `SchedulerError::Decode` if its contents are not a valid record list.
    pub fn read(&self) -> Result<Option<Vec<EventRecord>>, SchedulerError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SchedulerError::io(&self.path, e)),
        };
        let records = serde_json::from_slice(&data).map_err(SchedulerError::Decode)?;
        Ok(Some(records))
    }
}
