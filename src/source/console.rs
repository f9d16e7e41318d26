//! Console-backed [`TerminalSession`] used by the `shelltitle watch` command.
//!
//! The session's processes are the root and its live descendants as seen by
//! `sysinfo`; titles are written to stdout, one per line. Activity arrives as
//! lines read by [`spawn_line_reader`].

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{BoxFuture, SysinfoSource, TerminalSession};
use crate::models::{ProcessId, TitleSource};
use crate::{AppError, Result};

/// Terminal host that prints titles to stdout.
#[derive(Debug)]
pub struct ConsoleTerminal {
    root_pid: ProcessId,
    title_managed_by_process: AtomicBool,
}

impl ConsoleTerminal {
    /// Create a console host for the tree rooted at `root_pid`.
    #[must_use]
    pub fn new(root_pid: ProcessId) -> Self {
        Self {
            root_pid,
            title_managed_by_process: AtomicBool::new(true),
        }
    }

    /// Pin the title to a user-chosen value (`false`) or hand it back to
    /// process detection (`true`).
    pub fn set_title_managed_by_process(&self, managed: bool) {
        self.title_managed_by_process.store(managed, Ordering::SeqCst);
    }
}

impl TerminalSession for ConsoleTerminal {
    fn is_title_managed_by_process(&self) -> bool {
        self.title_managed_by_process.load(Ordering::SeqCst)
    }

    fn session_process_ids(&self) -> BoxFuture<'_, Result<Vec<ProcessId>>> {
        let root = self.root_pid;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || SysinfoSource::descendant_ids(root))
                .await
                .map_err(|err| AppError::Query(format!("process enumeration task panicked: {err}")))
        })
    }

    fn set_title(&self, title: &str, source: TitleSource) {
        let mut stdout = std::io::stdout().lock();
        let tag = if source.is_process_derived() { "process" } else { "user" };
        if let Err(err) = writeln!(stdout, "{tag}\t{title}") {
            warn!(%err, "failed to write title to stdout");
        }
    }
}

/// Read lines from `reader` on a dedicated OS thread.
///
/// The thread is detached: a read blocked on an idle input never holds up
/// runtime shutdown. The channel closes at end of input or after the first
/// read error, which is delivered before closing.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if line_tx.blocking_send(line).is_err() {
                debug!("line receiver dropped, stopping reader");
                return;
            }
            if failed {
                return;
            }
        }
    });
    line_rx
}
