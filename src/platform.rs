//! Operating-system gate for shell-name detection.
//!
//! Title detection by process-tree walking is only meaningful on Windows,
//! where terminal hosts cannot ask the pty for its foreground process. The
//! service factory consults [`Platform`] before creating a session.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Operating systems the crate can observe at runtime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    MacOs,
    /// Linux.
    Linux,
    /// Anything else.
    Other,
}

impl Platform {
    /// The only platform on which a shell-name session may be created.
    pub const TARGET: Self = Self::Windows;

    /// Platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Whether shell-name sessions are supported on this platform.
    #[must_use]
    pub fn is_target(self) -> bool {
        self == Self::TARGET
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Other => "unknown",
        };
        f.write_str(name)
    }
}
