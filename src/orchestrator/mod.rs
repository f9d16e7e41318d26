//! Session orchestration modules.
//!
//! Covers debouncing of terminal activity and the per-terminal service that
//! turns settled activity into title updates.

pub mod debouncer;
pub mod shell_name;

pub use debouncer::{ActivityDebouncer, ActivityDebouncerHandle, CheckSignal};
pub use shell_name::{CheckOutcome, ShellNameService};
