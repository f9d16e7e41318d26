//! Origin of a terminal title.

use serde::{Deserialize, Serialize};

/// Who decided the current terminal title.
///
/// Hosts keep user-chosen titles sticky; titles from [`TitleSource::Process`]
/// may be replaced by the next detection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleSource {
    /// Derived from the innermost process detected in the session.
    Process,
    /// Set explicitly by the user.
    User,
}

impl TitleSource {
    /// Whether the title came from process detection.
    #[must_use]
    pub fn is_process_derived(self) -> bool {
        matches!(self, Self::Process)
    }
}
