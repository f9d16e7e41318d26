//! Innermost-process resolution over a process snapshot.
//!
//! Starting at the session's root process, the resolver repeatedly descends
//! into the most recently started child until it reaches a process with no
//! children. That leaf is what the user is interacting with: a login shell
//! that launched `vim` resolves to `vim`, a shell that launched a sub-shell
//! resolves to the sub-shell.
//!
//! Everything here is pure and synchronous.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{ProcessId, ProcessRecord, ProcessSnapshot};

/// Parent → children mapping derived from one [`ProcessSnapshot`].
///
/// Every process in the snapshot has an entry, as does the root the index was
/// built for. Children are kept in snapshot order. A child is only indexed
/// under a parent that is itself present in the snapshot.
#[derive(Debug, Clone, Default)]
pub struct ChildIndex {
    children: HashMap<ProcessId, Vec<ProcessId>>,
}

impl ChildIndex {
    /// Group the snapshot's records by parent id.
    #[must_use]
    pub fn build(snapshot: &ProcessSnapshot, root: ProcessId) -> Self {
        let mut children: HashMap<ProcessId, Vec<ProcessId>> = snapshot
            .iter()
            .map(|record| (record.id, Vec::new()))
            .collect();
        children.entry(root).or_default();

        for record in snapshot.iter() {
            // Idle/system processes report themselves as their own parent.
            if record.parent_id == record.id || !snapshot.contains(record.parent_id) {
                continue;
            }
            if let Some(siblings) = children.get_mut(&record.parent_id) {
                siblings.push(record.id);
            }
        }

        Self { children }
    }

    /// Children of `id`, or `None` if the id was never indexed.
    #[must_use]
    pub fn children(&self, id: ProcessId) -> Option<&[ProcessId]> {
        self.children.get(&id).map(Vec::as_slice)
    }

    /// Whether `id` has an entry (possibly empty).
    #[must_use]
    pub fn contains(&self, id: ProcessId) -> bool {
        self.children.contains_key(&id)
    }
}

/// Pick the most recently started record among `candidates`.
///
/// Equal start times keep the earlier candidate.
fn newest_child<'a>(
    snapshot: &'a ProcessSnapshot,
    candidates: &[ProcessId],
) -> Option<&'a ProcessRecord> {
    candidates
        .iter()
        .filter_map(|&id| snapshot.get(id))
        .fold(None, |best: Option<&ProcessRecord>, candidate| match best {
            Some(current) if current.start_time >= candidate.start_time => Some(current),
            _ => Some(candidate),
        })
}

/// Walk from `root` to the innermost live descendant.
///
/// Returns the id the walk stopped at. The id may have no record in the
/// snapshot when `root` itself is absent.
#[must_use]
pub fn innermost_process_id(snapshot: &ProcessSnapshot, root: ProcessId) -> ProcessId {
    let index = ChildIndex::build(snapshot, root);
    let mut current = root;

    // A real process table is acyclic; the hop bound only matters for
    // hand-built snapshots.
    for _ in 0..=snapshot.len() {
        let Some(next) = index
            .children(current)
            .and_then(|children| newest_child(snapshot, children))
        else {
            return current;
        };
        current = next.id;
    }

    warn!(root_pid = root, stopped_at = current, "process tree walk exceeded snapshot size");
    current
}

/// Record of the innermost live descendant of `root`, if `root` is present.
#[must_use]
pub fn innermost_process(snapshot: &ProcessSnapshot, root: ProcessId) -> Option<&ProcessRecord> {
    snapshot.get(innermost_process_id(snapshot, root))
}

/// Name of the innermost live descendant of `root`, or `fallback` when the
/// walk ends on a process the snapshot does not describe.
#[must_use]
pub fn resolve_shell_name(snapshot: &ProcessSnapshot, root: ProcessId, fallback: &str) -> String {
    innermost_process(snapshot, root).map_or_else(|| fallback.to_owned(), |p| p.name.clone())
}
