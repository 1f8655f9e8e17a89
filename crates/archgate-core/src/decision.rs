//! Routing outcome

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the orchestrator does with an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Write to disk and commit
    Apply,
    /// Send back for targeted regeneration
    Retry,
    /// Discard and log
    Rollback,
}

impl Action {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Retry => "retry",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's verdict on one envelope
///
/// Echoes the statuses it was computed from so that the record stands on its
/// own in the run archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    action: Action,
    global_status: String,
    next_action: String,
    reasons: Vec<String>,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_comment: Option<String>,
}

impl Decision {
    pub(crate) fn new(
        action: Action,
        global_status: String,
        next_action: String,
        reasons: Vec<String>,
        summary: String,
        file_comment: Option<String>,
        module_comment: Option<String>,
    ) -> Self {
        Self {
            action,
            global_status,
            next_action,
            reasons,
            summary,
            file_comment,
            module_comment,
        }
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Empty when the envelope carried none
    #[must_use]
    pub fn global_status(&self) -> &str {
        &self.global_status
    }

    #[must_use]
    pub fn next_action(&self) -> &str {
        &self.next_action
    }

    /// Short, ordered, deduplicated reasons from the checker comments
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    #[must_use]
    pub fn file_comment(&self) -> Option<&str> {
        self.file_comment.as_deref()
    }

    #[must_use]
    pub fn module_comment(&self) -> Option<&str> {
        self.module_comment.as_deref()
    }
}
