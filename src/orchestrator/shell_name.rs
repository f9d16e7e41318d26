//! Shell-name service keeping a terminal's title on its innermost process.
//!
//! One [`ShellNameService`] is bound to one terminal session and its root
//! shell process. Terminal output is fed in through
//! [`notify_activity`](ShellNameService::notify_activity); once output
//! settles, the debouncer requests a check, and the service:
//!
//! 1. skips the check if the user has taken over the title,
//! 2. asks the terminal host for the session's process ids,
//! 3. looks those ids up in the process table,
//! 4. resolves the innermost process name,
//! 5. applies it as a process-derived title unless the service was disposed
//!    or a newer check has already applied its result.
//!
//! Each check runs in its own task so a slow lookup never holds back the
//! next trigger.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::debouncer::{ActivityDebouncer, ActivityDebouncerHandle, CheckSignal};
use crate::config::ShellTitleConfig;
use crate::models::{ProcessId, ProcessSnapshot, TitleSource};
use crate::platform::Platform;
use crate::resolver::resolve_shell_name;
use crate::source::{OutstandingQueries, ProcessInfoSource, TerminalSession};
use crate::{AppError, Result};

/// Result of one check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The title was set to the resolved name.
    Applied(String),
    /// The title is under user control; nothing was queried.
    Skipped,
    /// The service was disposed while the lookup was in flight, whether the
    /// lookup then succeeded or was killed.
    Discarded,
    /// A check started later already applied its title.
    Stale,
}

/// State shared between the service handle and its check tasks.
struct ServiceInner {
    root_pid: ProcessId,
    fallback_name: String,
    terminal: Arc<dyn TerminalSession>,
    source: Arc<dyn ProcessInfoSource>,
    queries: OutstandingQueries,
    disposed: AtomicBool,
    drop_stale_results: bool,
    /// Sequence number of the most recently started check.
    issued: AtomicU64,
    /// Sequence number of the check whose title is currently shown.
    applied: AtomicU64,
}

impl ServiceInner {
    async fn get_shell_name(&self) -> Result<String> {
        let ids = self.terminal.session_process_ids().await?;
        let records = self.source.lookup(&ids, &self.queries).await?;
        let snapshot = ProcessSnapshot::new(records);
        Ok(resolve_shell_name(
            &snapshot,
            self.root_pid,
            &self.fallback_name,
        ))
    }

    async fn check_shell(&self) -> Result<CheckOutcome> {
        if !self.terminal.is_title_managed_by_process() {
            debug!("title is user-managed, skipping check");
            return Ok(CheckOutcome::Skipped);
        }

        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let name = match self.get_shell_name().await {
            Ok(name) => name,
            // Disposal kills outstanding queries, so their failure is expected.
            Err(err) if self.disposed.load(Ordering::SeqCst) => {
                debug!(seq, %err, "service disposed, discarding failed lookup");
                return Ok(CheckOutcome::Discarded);
            }
            Err(err) => return Err(err),
        };

        if self.disposed.load(Ordering::SeqCst) {
            debug!(seq, name, "service disposed, discarding result");
            return Ok(CheckOutcome::Discarded);
        }

        if self.drop_stale_results {
            let newest = self.applied.fetch_max(seq, Ordering::SeqCst);
            if newest > seq {
                debug!(seq, newest, name, "newer check already applied, discarding result");
                return Ok(CheckOutcome::Stale);
            }
        }

        self.terminal.set_title(&name, TitleSource::Process);
        Ok(CheckOutcome::Applied(name))
    }
}

/// Per-terminal service that resolves and applies the innermost shell name.
pub struct ShellNameService {
    inner: Arc<ServiceInner>,
    debouncer: Option<ActivityDebouncerHandle>,
    trigger_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ShellNameService {
    /// Create a service for the terminal whose shell runs as `root_pid` and
    /// start its debounce and trigger tasks.
    ///
    /// `fallback_name` is reported whenever the root process cannot be found.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnsupportedPlatform` if `platform` is not the
    /// platform shell-name detection targets; no tasks are started.
    pub fn spawn(
        platform: Platform,
        root_pid: ProcessId,
        fallback_name: impl Into<String>,
        terminal: Arc<dyn TerminalSession>,
        source: Arc<dyn ProcessInfoSource>,
        config: &ShellTitleConfig,
    ) -> Result<Self> {
        if !platform.is_target() {
            return Err(AppError::UnsupportedPlatform(format!(
                "shell name detection cannot be instantiated on {platform}"
            )));
        }

        let inner = Arc::new(ServiceInner {
            root_pid,
            fallback_name: fallback_name.into(),
            terminal,
            source,
            queries: OutstandingQueries::new(),
            disposed: AtomicBool::new(false),
            drop_stale_results: config.drop_stale_results,
            issued: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        });

        let cancel = CancellationToken::new();
        let (check_tx, check_rx) = mpsc::channel(8);
        let debouncer =
            ActivityDebouncer::new(config.debounce_window(), check_tx, cancel.child_token())
                .spawn();

        let trigger_task = tokio::spawn(
            Self::run_triggers(Arc::clone(&inner), check_rx, cancel.clone())
                .instrument(info_span!("shell_name_service", root_pid)),
        );

        info!(
            root_pid,
            debounce_ms = config.debounce_ms,
            "shell name service started"
        );

        Ok(Self {
            inner,
            debouncer: Some(debouncer),
            trigger_task: Some(trigger_task),
            cancel,
        })
    }

    /// Dispatch every debounced check to its own task until cancelled.
    async fn run_triggers(
        inner: Arc<ServiceInner>,
        mut check_rx: mpsc::Receiver<CheckSignal>,
        cancel: CancellationToken,
    ) {
        loop {
            let signal = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("trigger loop cancelled");
                    break;
                }
                maybe_signal = check_rx.recv() => {
                    if let Some(s) = maybe_signal { s } else {
                        debug!("check channel closed");
                        break;
                    }
                }
            };

            let inner = Arc::clone(&inner);
            tokio::spawn(
                async move {
                    match inner.check_shell().await {
                        Ok(CheckOutcome::Applied(name)) => info!(name, "terminal title updated"),
                        Ok(outcome) => debug!(?outcome, "check finished without update"),
                        Err(err) => warn!(%err, "shell check failed"),
                    }
                }
                .instrument(info_span!("check_shell", coalesced = signal.coalesced)),
            );
        }
    }

    /// Report terminal output; restarts the debounce window.
    pub fn notify_activity(&self) {
        if let Some(ref debouncer) = self.debouncer {
            debouncer.signal();
        }
    }

    /// Resolve the innermost process name once, without touching the title.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Query` if either external lookup fails.
    pub async fn get_shell_name(&self) -> Result<String> {
        self.inner.get_shell_name().await
    }

    /// Run one full check cycle immediately, bypassing the debouncer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Query` if either external lookup fails.
    pub async fn check_shell(&self) -> Result<CheckOutcome> {
        self.inner.check_shell().await
    }

    /// Root process this service is bound to.
    #[must_use]
    pub fn root_pid(&self) -> ProcessId {
        self.inner.root_pid
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Query processes currently tracked for kill-on-dispose.
    #[must_use]
    pub fn outstanding_queries(&self) -> &OutstandingQueries {
        &self.inner.queries
    }

    /// Tear the service down.
    ///
    /// Stops the debouncer, turns in-flight checks into no-ops and kills
    /// any outstanding query process. Safe to call more than once.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            info!(root_pid = self.inner.root_pid, "shell name service disposed");
        }
        self.cancel.cancel();

        let killed = self.inner.queries.kill_all();
        if killed > 0 {
            debug!(killed, "terminated outstanding query processes");
        }
    }

    /// Dispose and wait for the background tasks to exit.
    ///
    /// Checks already in flight are not awaited; their results are discarded.
    pub async fn shutdown(mut self) {
        self.dispose();
        if let Some(debouncer) = self.debouncer.take() {
            debouncer.await_completion().await;
        }
        if let Some(task) = self.trigger_task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ShellNameService {
    fn drop(&mut self) {
        self.dispose();
    }
}
