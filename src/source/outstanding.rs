//! Registry of in-flight external query processes.
//!
//! Out-of-process lookups (e.g. `wmic`) park their child here while reading
//! its output. When a session is disposed every parked child is killed; a
//! child that already exited is ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::Child;
use tracing::debug;

/// Ticket identifying one tracked query process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryTicket(u64);

/// Shared registry of live query processes, cloned into every check.
#[derive(Debug, Clone, Default)]
pub struct OutstandingQueries {
    children: Arc<Mutex<HashMap<QueryTicket, Child>>>,
    next_ticket: Arc<AtomicU64>,
}

impl OutstandingQueries {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<QueryTicket, Child>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a spawned query process.
    pub fn track(&self, child: Child) -> QueryTicket {
        let ticket = QueryTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst));
        self.guard().insert(ticket, child);
        ticket
    }

    /// Stop tracking a query and hand its process back.
    ///
    /// Returns `None` if the process was already killed by [`kill_all`](Self::kill_all).
    pub fn release(&self, ticket: QueryTicket) -> Option<Child> {
        self.guard().remove(&ticket)
    }

    /// Number of queries currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Whether no query is currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Kill every tracked query process. Safe to call repeatedly.
    ///
    /// Returns how many processes were signalled.
    pub fn kill_all(&self) -> usize {
        let drained: Vec<(QueryTicket, Child)> = self.guard().drain().collect();
        let count = drained.len();

        for (ticket, mut child) in drained {
            let pid = child.id();
            match child.start_kill() {
                Ok(()) => debug!(?ticket, pid, "killed outstanding query process"),
                // Already exited and reaped.
                Err(err) => debug!(?ticket, pid, %err, "query process already gone"),
            }
        }

        count
    }
}
