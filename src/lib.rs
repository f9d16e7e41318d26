#![forbid(unsafe_code)]

//! Detects which process a user is actually interacting with inside a
//! terminal session, so the host can title the terminal after it.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod resolver;
pub mod source;

pub use config::ShellTitleConfig;
pub use errors::{AppError, Result};
