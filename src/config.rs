//! Configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Backend used to read process details for a snapshot.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryBackend {
    /// In-process lookup through the `sysinfo` crate.
    #[default]
    Sysinfo,
    /// Out-of-process `wmic` query; the child is killed when the session is disposed.
    Wmic,
}

/// Process-info query settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueryConfig {
    /// Which backend answers process-info lookups.
    #[serde(default)]
    pub backend: QueryBackend,
    /// Executable used by the `wmic` backend.
    #[serde(default = "default_wmic_path")]
    pub wmic_path: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            backend: QueryBackend::default(),
            wmic_path: default_wmic_path(),
        }
    }
}

fn default_wmic_path() -> String {
    "wmic".into()
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

/// Global configuration parsed from `shelltitle.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ShellTitleConfig {
    /// Quiet period after the last terminal output before a check runs.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Discard results of checks that were overtaken by a newer check.
    ///
    /// On by default; `false` lets the last check to complete win.
    #[serde(default = "default_true")]
    pub drop_stale_results: bool,
    /// Process-info query settings.
    #[serde(default)]
    pub query: QueryConfig,
}

impl Default for ShellTitleConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            drop_stale_results: true,
            query: QueryConfig::default(),
        }
    }
}

impl ShellTitleConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(AppError::Config(
                "debounce_ms must be greater than zero".into(),
            ));
        }

        if self.query.wmic_path.trim().is_empty() {
            return Err(AppError::Config("query.wmic_path must not be empty".into()));
        }

        Ok(())
    }
}
