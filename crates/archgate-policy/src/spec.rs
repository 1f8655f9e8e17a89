//! Policy document
//!
//! [`PolicySpec`] is the declarative risk policy read from YAML (or JSON).
//! Every section and field is optional and falls back to the defaults below.
//!
//! ```yaml
//! policy_id: SDP-0001
//! mode: warn
//! limits:
//!   max_files_changed: 3
//! paths:
//!   forbidden: ["infra/**"]
//! ```

use crate::error::PolicyError;
use crate::mode::PolicyMode;
use archgate_artifact::{Sentinels, BEGIN_SENTINEL, END_SENTINEL};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Blast-radius limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_files_changed: u64,
    pub max_loc_added: u64,
    pub max_loc_deleted: u64,
    pub max_patch_size_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_files_changed: 5,
            max_loc_added: 160,
            max_loc_deleted: 80,
            max_patch_size_bytes: 20_000,
        }
    }
}

/// Path allow/deny rules (glob patterns)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub forbidden: Vec<String>,
    /// Empty means no allow-list
    pub allowed: Vec<String>,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            forbidden: vec!["infra/**".into(), "secrets/**".into()],
            allowed: Vec::new(),
        }
    }
}

/// Sentinel requirements on the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    pub require_begin_end: bool,
    pub begin: String,
    pub end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            require_begin_end: true,
            begin: BEGIN_SENTINEL.into(),
            end: END_SENTINEL.into(),
        }
    }
}

impl Markers {
    /// Sentinel pair for block parsing
    #[must_use]
    pub fn sentinels(&self) -> Sentinels {
        Sentinels {
            begin: self.begin.clone(),
            end: self.end.clone(),
        }
    }
}

/// Binary file rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binaries {
    pub allow_binary_changes: bool,
    pub forbidden_extensions: Vec<String>,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            allow_binary_changes: false,
            forbidden_extensions: [".png", ".jpg", ".pdf", ".exe", ".dll", ".so"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Run budgets
///
/// Carried for the surrounding pipeline; the gate itself does not meter them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    pub llm_tokens_max: u64,
    pub total_run_timeout_seconds: u64,
    pub checker_timeout_seconds: u64,
    pub retry_limit: u32,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            llm_tokens_max: 0,
            total_run_timeout_seconds: 180,
            checker_timeout_seconds: 60,
            retry_limit: 2,
        }
    }
}

/// Minimum acceptance gates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitGate {
    pub require_file_checker_ok: bool,
    pub module_status_allow: Vec<String>,
    pub max_partial_ok_allowed: u32,
}

impl Default for CommitGate {
    fn default() -> Self {
        Self {
            require_file_checker_ok: true,
            module_status_allow: vec!["ok".into(), "partial_ok".into()],
            max_partial_ok_allowed: 2,
        }
    }
}

/// The risk policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySpec {
    pub policy_id: String,
    pub version: u32,
    pub mode: PolicyMode,
    pub require_clone: bool,
    pub sandbox_prefix: String,
    pub limits: Limits,
    pub paths: Paths,
    pub protected_files: Vec<String>,
    pub markers: Markers,
    pub binaries: Binaries,
    pub budgets: Budgets,
    pub commit_gate: CommitGate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for PolicySpec {
    fn default() -> Self {
        Self {
            policy_id: "SDP-0001".into(),
            version: 1,
            mode: PolicyMode::Enforce,
            require_clone: true,
            sandbox_prefix: "archcode-self/".into(),
            limits: Limits::default(),
            paths: Paths::default(),
            protected_files: vec!["core/types.py".into(), ".github/workflows/**".into()],
            markers: Markers::default(),
            binaries: Binaries::default(),
            budgets: Budgets::default(),
            commit_gate: CommitGate::default(),
            notes: None,
        }
    }
}

impl PolicySpec {
    /// Parse a policy document; blank input yields the defaults
    ///
    /// # Errors
    /// Returns [`PolicyError`] on malformed input or failed validation
    pub fn from_yaml_str(text: &str) -> Result<Self, PolicyError> {
        let spec = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Load a policy file (YAML or JSON)
    ///
    /// # Errors
    /// Returns [`PolicyError`] if the file cannot be read, decoded or validated
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| PolicyError::io_error(path, e))?;
        let spec = Self::from_yaml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            policy_id = %spec.policy_id,
            mode = %spec.mode,
            "policy loaded"
        );
        Ok(spec)
    }

    /// Semantic checks that serde cannot express
    ///
    /// # Errors
    /// Returns [`PolicyError::Invalid`] naming the offending field
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.policy_id.trim().is_empty() {
            return Err(PolicyError::invalid("policy_id is empty"));
        }
        if self.require_clone && self.sandbox_prefix.is_empty() {
            return Err(PolicyError::invalid(
                "sandbox_prefix is empty while require_clone is set",
            ));
        }
        if self.markers.require_begin_end
            && (self.markers.begin.is_empty() || self.markers.end.is_empty())
        {
            return Err(PolicyError::invalid(
                "markers.begin/markers.end are empty while require_begin_end is set",
            ));
        }
        if let Some(ext) = self
            .binaries
            .forbidden_extensions
            .iter()
            .find(|e| e.trim().is_empty())
        {
            return Err(PolicyError::invalid(format!(
                "binaries.forbidden_extensions contains a blank entry '{ext}'"
            )));
        }
        Ok(())
    }
}
