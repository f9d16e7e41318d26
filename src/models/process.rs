//! Process records and point-in-time snapshots of the process table.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating-system process identifier.
pub type ProcessId = u32;

/// Point-in-time fact about one OS process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessRecord {
    /// Process identifier, unique within a snapshot.
    pub id: ProcessId,
    /// Parent process identifier; may be absent from the snapshot or equal to `id`.
    pub parent_id: ProcessId,
    /// Display name of the executable (e.g. `bash.exe`).
    pub name: String,
    /// Absolute executable path, when the OS exposes it.
    pub path: Option<PathBuf>,
    /// Process start instant. Only compared against siblings in the same snapshot.
    pub start_time: DateTime<Utc>,
}

impl ProcessRecord {
    /// Construct a record without an executable path.
    #[must_use]
    pub fn new(
        id: ProcessId,
        parent_id: ProcessId,
        name: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            path: None,
            start_time,
        }
    }

    /// Attach the executable path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Immutable mapping from process id to [`ProcessRecord`] for one resolution.
///
/// Records keep the order they were supplied in; sibling tie-breaks depend on
/// it. When an id repeats, the first record is kept.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    records: Vec<ProcessRecord>,
    by_id: HashMap<ProcessId, usize>,
}

impl ProcessSnapshot {
    /// Build a snapshot from records in source order.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            if snapshot.by_id.contains_key(&record.id) {
                continue;
            }
            snapshot.by_id.insert(record.id, snapshot.records.len());
            snapshot.records.push(record);
        }
        snapshot
    }

    /// Look up a record by process id.
    #[must_use]
    pub fn get(&self, id: ProcessId) -> Option<&ProcessRecord> {
        self.by_id.get(&id).map(|&idx| &self.records[idx])
    }

    /// Whether the snapshot contains a record for `id`.
    #[must_use]
    pub fn contains(&self, id: ProcessId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Records in source order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.iter()
    }

    /// Number of distinct processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<ProcessRecord> for ProcessSnapshot {
    fn from_iter<I: IntoIterator<Item = ProcessRecord>>(iter: I) -> Self {
        Self::new(iter)
    }
}
