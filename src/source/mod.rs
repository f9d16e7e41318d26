//! Collaborator seams for shell-name detection.
//!
//! The [`ProcessInfoSource`] trait decouples the resolver from how the OS
//! process table is read, and [`TerminalSession`] decouples the service from
//! the terminal host that owns the title. Both traits return boxed futures so
//! they can be used as `Arc<dyn …>` inside spawned tasks.

pub mod console;
pub mod outstanding;
pub mod sysinfo_source;
pub mod wmic;

use std::future::Future;
use std::pin::Pin;

use crate::models::{ProcessId, ProcessRecord, TitleSource};
use crate::Result;

pub use console::{spawn_line_reader, ConsoleTerminal};
pub use outstanding::OutstandingQueries;
pub use sysinfo_source::SysinfoSource;
pub use wmic::WmicSource;

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reads process details for a set of process ids.
pub trait ProcessInfoSource: Send + Sync {
    /// Look up the given ids.
    ///
    /// Ids that no longer exist are omitted from the result rather than
    /// failing the call. Implementations that run an external process must
    /// register it in `queries` so a disposed session can kill it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Query`](crate::AppError::Query) if the lookup
    /// itself cannot be performed.
    fn lookup<'a>(
        &'a self,
        ids: &'a [ProcessId],
        queries: &'a OutstandingQueries,
    ) -> BoxFuture<'a, Result<Vec<ProcessRecord>>>;
}

/// Terminal host that owns the session's processes and title.
pub trait TerminalSession: Send + Sync {
    /// Whether the title currently follows the running process rather than an
    /// explicit user override.
    fn is_title_managed_by_process(&self) -> bool;

    /// Process ids currently belonging to the terminal session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Query`](crate::AppError::Query) if the host cannot
    /// enumerate its processes.
    fn session_process_ids(&self) -> BoxFuture<'_, Result<Vec<ProcessId>>>;

    /// Apply a new title to the terminal.
    fn set_title(&self, title: &str, source: TitleSource);
}
