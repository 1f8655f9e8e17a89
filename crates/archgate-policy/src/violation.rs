//! Policy violations and verdicts

use serde::Serialize;
use std::fmt;

/// Blast-radius metric that exceeded its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitField {
    FilesChanged,
    LocAdded,
    LocDeleted,
    PatchSizeBytes,
}

impl LimitField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilesChanged => "files_changed",
            Self::LocAdded => "loc_added",
            Self::LocDeleted => "loc_deleted",
            Self::PatchSizeBytes => "patch_size_bytes",
        }
    }
}

/// One broken rule
///
/// The [`Display`](fmt::Display) form always names the offending field, e.g.
/// `files_changed=6 > 5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    BranchNotSandboxed { branch: String, prefix: String },
    LimitExceeded { field: LimitField, actual: u64, max: u64 },
    PathNotAllowed { path: String },
    ForbiddenPath { path: String, pattern: String },
    ProtectedFile { path: String, pattern: String },
    BinaryChange,
    ForbiddenExtension { path: String, extension: String },
    MissingMarkers { begin: String, end: String },
    FileCheckNotOk { actual: String },
    ModuleStatusNotAllowed { actual: String },
    PartialOkQuota { count: u32, max: u32 },
}

impl Violation {
    /// Field or rule this violation is about
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::BranchNotSandboxed { .. } => "sandbox_prefix",
            Self::LimitExceeded { field, .. } => field.as_str(),
            Self::PathNotAllowed { .. } => "paths.allowed",
            Self::ForbiddenPath { .. } => "paths.forbidden",
            Self::ProtectedFile { .. } => "protected_files",
            Self::BinaryChange => "binaries.allow_binary_changes",
            Self::ForbiddenExtension { .. } => "binaries.forbidden_extensions",
            Self::MissingMarkers { .. } => "markers.require_begin_end",
            Self::FileCheckNotOk { .. } => "commit_gate.require_file_checker_ok",
            Self::ModuleStatusNotAllowed { .. } => "commit_gate.module_status_allow",
            Self::PartialOkQuota { .. } => "commit_gate.max_partial_ok_allowed",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BranchNotSandboxed { branch, prefix } => {
                write!(f, "branch '{branch}' does not start with sandbox_prefix '{prefix}'")
            }
            Self::LimitExceeded { field, actual, max } => {
                write!(f, "{}={actual} > {max}", field.as_str())
            }
            Self::PathNotAllowed { path } => write!(f, "path '{path}' not in paths.allowed"),
            Self::ForbiddenPath { path, pattern } => {
                write!(f, "path '{path}' matches paths.forbidden '{pattern}'")
            }
            Self::ProtectedFile { path, pattern } => {
                write!(f, "path '{path}' matches protected_files '{pattern}'")
            }
            Self::BinaryChange => {
                f.write_str("has_binary=true while binaries.allow_binary_changes=false")
            }
            Self::ForbiddenExtension { path, extension } => {
                write!(f, "path '{path}' has forbidden extension '{extension}'")
            }
            Self::MissingMarkers { begin, end } => {
                write!(f, "markers '{begin}' / '{end}' missing from payload")
            }
            Self::FileCheckNotOk { actual } => write!(f, "file_check='{actual}' != ok"),
            Self::ModuleStatusNotAllowed { actual } => {
                write!(f, "global_status={actual} not in commit_gate.module_status_allow")
            }
            Self::PartialOkQuota { count, max } => {
                write!(f, "partial_ok count {count} >= max_partial_ok_allowed {max}")
            }
        }
    }
}

/// Result of evaluating a change against the policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyVerdict {
    /// Whether the change may proceed under the policy mode
    pub ok: bool,
    /// Every violation found, in check order, whatever the mode
    pub violations: Vec<Violation>,
}

impl PolicyVerdict {
    /// Violations rendered as strings
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    /// Messages joined for a single console line
    #[must_use]
    pub fn summary(&self) -> String {
        self.messages().join("; ")
    }

    /// Whether any violation was found
    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}
