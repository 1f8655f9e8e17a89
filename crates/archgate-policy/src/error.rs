//! Error types for policy loading

use std::path::PathBuf;

/// Errors raised while loading or compiling a policy
///
/// Evaluation itself never fails; every problem with a change is a
/// [`crate::Violation`].
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Policy file could not be read
    #[error("io error reading policy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy text is not valid YAML/JSON for the schema
    #[error("invalid policy document: {0}")]
    Decode(#[from] serde_yaml::Error),

    /// A glob pattern does not compile
    #[error("invalid glob '{pattern}' in {field}: {source}")]
    InvalidGlob {
        field: &'static str,
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Semantic check on the loaded values failed
    #[error("invalid policy: {0}")]
    Invalid(String),
}

impl PolicyError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a semantic validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_display() {
        let err = PolicyError::invalid("markers.begin is empty");
        assert_eq!(err.to_string(), "invalid policy: markers.begin is empty");
    }
}
