//! In-process [`ProcessInfoSource`] backed by the `sysinfo` crate.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

use super::{BoxFuture, OutstandingQueries, ProcessInfoSource};
use crate::models::{ProcessId, ProcessRecord};
use crate::{AppError, Result};

/// Reads the process table through `sysinfo` on a blocking worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoSource;

impl SysinfoSource {
    /// Create a new source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Look up the given ids synchronously, preserving their order.
    #[must_use]
    pub fn lookup_blocking(ids: &[ProcessId]) -> Vec<ProcessRecord> {
        let pids: Vec<Pid> = ids.iter().map(|&id| Pid::from_u32(id)).collect();
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );

        pids.iter()
            .filter_map(|&pid| system.process(pid).map(|p| to_record(pid, p)))
            .collect()
    }

    /// The root and all of its live descendants, breadth first.
    ///
    /// Returns an empty list if `root` is not running.
    #[must_use]
    pub fn descendant_ids(root: ProcessId) -> Vec<ProcessId> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        if system.process(Pid::from_u32(root)).is_none() {
            return Vec::new();
        }

        let mut children: HashMap<ProcessId, Vec<ProcessId>> = HashMap::new();
        for (pid, process) in system.processes() {
            if let Some(parent) = process.parent() {
                children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(pid.as_u32());
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_unstable();
        }

        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(pid) = queue.pop_front() {
            if !seen.insert(pid) {
                continue;
            }
            ordered.push(pid);
            if let Some(kids) = children.get(&pid) {
                queue.extend(kids.iter().copied());
            }
        }
        ordered
    }
}

fn to_record(pid: Pid, process: &Process) -> ProcessRecord {
    let id = pid.as_u32();
    let start_time = i64::try_from(process.start_time())
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(DateTime::UNIX_EPOCH);

    ProcessRecord {
        id,
        parent_id: process.parent().map_or(id, Pid::as_u32),
        name: process.name().to_string_lossy().into_owned(),
        path: process.exe().map(std::path::Path::to_path_buf),
        start_time,
    }
}

impl ProcessInfoSource for SysinfoSource {
    fn lookup<'a>(
        &'a self,
        ids: &'a [ProcessId],
        _queries: &'a OutstandingQueries,
    ) -> BoxFuture<'a, Result<Vec<ProcessRecord>>> {
        Box::pin(async move {
            let owned = ids.to_vec();
            let records = tokio::task::spawn_blocking(move || Self::lookup_blocking(&owned))
                .await
                .map_err(|err| AppError::Query(format!("process lookup task panicked: {err}")))?;
            debug!(requested = ids.len(), found = records.len(), "sysinfo lookup complete");
            Ok(records)
        })
    }
}
