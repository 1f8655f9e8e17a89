//! Upstream status vocabulary
//!
//! The closed sets of values that upstream checkers write onto an envelope:
//! module-level [`GlobalStatus`], the suggested [`NextAction`], and the
//! structured [`ErrorCategory`].

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Global (module-level) verdict written by the module checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalStatus {
    /// Change accepted as-is
    Ok,
    /// Not yet evaluated
    Pending,
    /// Change rejected
    Rejected,
    /// Accepted with reservations
    PartialOk,
}

impl GlobalStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::PartialOk => "partial_ok",
        }
    }
}

/// Next step suggested by the module checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Accept and integrate
    Accept,
    /// Regenerate
    Retry,
    /// Discard
    Rollback,
}

impl NextAction {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Retry => "retry",
            Self::Rollback => "rollback",
        }
    }
}

/// Structured error classification attached by upstream checkers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Generated code does not parse
    #[serde(alias = "syntax_error")]
    Syntax,
    /// Code is locally valid but inconsistent with its module
    ModuleIncoherence,
    /// Change breaks the risk policy
    PolicyViolation,
    /// Unrecoverable failure
    Fatal,
    /// Anything else
    Unknown,
}

impl ErrorCategory {
    /// All categories, in declaration order
    pub const ALL: [ErrorCategory; 5] = [
        Self::Syntax,
        Self::ModuleIncoherence,
        Self::PolicyViolation,
        Self::Fatal,
        Self::Unknown,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::ModuleIncoherence => "module_incoherence",
            Self::PolicyViolation => "policy_violation",
            Self::Fatal => "fatal",
            Self::Unknown => "unknown",
        }
    }
}

/// Unrecognized status token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind}: '{value}'")]
pub struct StatusParseError {
    /// Which vocabulary was being parsed
    pub kind: &'static str,
    /// Offending input
    pub value: String,
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for GlobalStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "ok" => Ok(Self::Ok),
            "pending" => Ok(Self::Pending),
            "rejected" => Ok(Self::Rejected),
            "partial_ok" => Ok(Self::PartialOk),
            _ => Err(StatusParseError {
                kind: "global status",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for NextAction {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "accept" => Ok(Self::Accept),
            "retry" => Ok(Self::Retry),
            "rollback" => Ok(Self::Rollback),
            _ => Err(StatusParseError {
                kind: "next action",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for ErrorCategory {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "syntax" | "syntax_error" => Ok(Self::Syntax),
            "module_incoherence" => Ok(Self::ModuleIncoherence),
            "policy_violation" => Ok(Self::PolicyViolation),
            "fatal" => Ok(Self::Fatal),
            "unknown" => Ok(Self::Unknown),
            _ => Err(StatusParseError {
                kind: "error category",
                value: s.to_string(),
            }),
        }
    }
}

/// Envelope field adapters that read statuses through [`FromStr`]
///
/// Upstream checkers are not consistent about case, so a strict serde enum
/// would reject whole envelopes over `OK`. Unrecognized statuses read as
/// absent and unrecognized categories as [`ErrorCategory::Unknown`].
pub(crate) mod lenient {
    use super::*;

    fn token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.filter(|s| !s.trim().is_empty()))
    }

    pub(crate) fn global_status<'de, D>(deserializer: D) -> Result<Option<GlobalStatus>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(token(deserializer)?.and_then(|s| s.parse().ok()))
    }

    pub(crate) fn next_action<'de, D>(deserializer: D) -> Result<Option<NextAction>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(token(deserializer)?.and_then(|s| s.parse().ok()))
    }

    pub(crate) fn error_category<'de, D>(
        deserializer: D,
    ) -> Result<Option<ErrorCategory>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(token(deserializer)?.map(|s| s.parse().unwrap_or(ErrorCategory::Unknown)))
    }
}

impl fmt::Display for GlobalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
