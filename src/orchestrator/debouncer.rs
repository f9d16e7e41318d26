//! Trailing-edge debounce of terminal activity.
//!
//! Every chunk of terminal output calls [`ActivityDebouncerHandle::signal`].
//! The background task waits until the terminal has been quiet for the full
//! window, then emits a single [`CheckSignal`]. Any signal that arrives while
//! the window is open restarts it, so a burst of output of any length
//! produces exactly one check once it settles.
//!
//! Checks are delivered via a `tokio::sync::mpsc` channel so the shell-name
//! service can react without sharing state with the timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, Instrument};

/// Emitted once a burst of activity has been quiet for the full window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSignal {
    /// Number of activity signals folded into this check.
    pub coalesced: u64,
}

/// Builder for a per-session activity debouncer.
///
/// Call [`spawn`](Self::spawn) to start the background timer task.
pub struct ActivityDebouncer {
    window: Duration,
    check_tx: mpsc::Sender<CheckSignal>,
    cancel: CancellationToken,
}

impl ActivityDebouncer {
    /// Construct a new debouncer (does not start the timer yet).
    #[must_use]
    pub fn new(
        window: Duration,
        check_tx: mpsc::Sender<CheckSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            window,
            check_tx,
            cancel,
        }
    }

    /// Spawn the background timer task and return a handle for signalling it.
    #[must_use]
    pub fn spawn(self) -> ActivityDebouncerHandle {
        let activity = Arc::new(Notify::new());
        let pending = Arc::new(AtomicU64::new(0));
        let cancel_for_handle = self.cancel.clone();

        let task_handle = tokio::spawn(
            Self::run(
                self.window,
                self.check_tx,
                self.cancel,
                Arc::clone(&activity),
                Arc::clone(&pending),
            )
            .instrument(info_span!("activity_debouncer")),
        );

        ActivityDebouncerHandle {
            activity,
            pending,
            join_handle: Some(task_handle),
            cancel: cancel_for_handle,
        }
    }

    /// Core timer loop.
    async fn run(
        window: Duration,
        check_tx: mpsc::Sender<CheckSignal>,
        cancel: CancellationToken,
        activity: Arc<Notify>,
        pending: Arc<AtomicU64>,
    ) {
        loop {
            // ── Idle: wait for the first signal of a burst ───
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("activity debouncer cancelled");
                    return;
                }
                () = activity.notified() => {}
            }

            // ── Open window: restart on every signal ─────────
            loop {
                let quiet = tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("activity debouncer cancelled");
                        return;
                    }
                    () = tokio::time::sleep(window) => true,
                    () = activity.notified() => false,
                };

                if quiet {
                    break;
                }
                trace!("activity inside window, restarting timer");
            }

            let coalesced = pending.swap(0, Ordering::SeqCst);
            debug!(coalesced, "activity settled, requesting check");
            if check_tx.send(CheckSignal { coalesced }).await.is_err() {
                debug!("check receiver dropped, stopping debouncer");
                return;
            }
        }
    }
}

/// Handle returned from [`ActivityDebouncer::spawn`] for feeding activity.
pub struct ActivityDebouncerHandle {
    activity: Arc<Notify>,
    pending: Arc<AtomicU64>,
    /// Task handle for the background timer loop.
    join_handle: Option<JoinHandle<()>>,
    /// Cancelled when the handle is dropped.
    cancel: CancellationToken,
}

impl Drop for ActivityDebouncerHandle {
    /// Cancel the background timer task when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ActivityDebouncerHandle {
    /// Record one unit of terminal activity and (re)start the quiet window.
    pub fn signal(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.activity.notify_one();
    }

    /// Stop the timer without waiting for the task to exit.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Signal the background task to stop and wait for it to exit.
    ///
    /// If no `JoinHandle` is stored, this is a no-op.
    pub async fn await_completion(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
