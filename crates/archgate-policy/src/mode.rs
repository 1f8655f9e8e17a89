//! Enforcement mode

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How strictly violations are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Any violation blocks
    #[default]
    Enforce,
    /// Violations are reported but never block
    Warn,
    /// Nothing blocks
    Off,
}

impl PolicyMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Warn => "warn",
            Self::Off => "off",
        }
    }

    /// Whether violations under this mode block the change
    #[must_use]
    pub const fn blocks(self) -> bool {
        matches!(self, Self::Enforce)
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized mode string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown policy mode '{0}' (expected enforce, warn or off)")]
pub struct UnknownMode(pub String);

impl FromStr for PolicyMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "warn" => Ok(Self::Warn),
            "off" => Ok(Self::Off),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}
