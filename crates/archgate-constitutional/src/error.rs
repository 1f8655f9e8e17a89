//! Error types for the filesystem boundary
//!
//! - [`ApplyError`]: writing an envelope into its target file
//! - [`AuditError`]: writing run artifacts

use archgate_artifact::EnvelopeError;
use std::path::PathBuf;

/// Errors during envelope application
///
/// Envelope problems are raised before the target file is touched.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Malformed block or missing target
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Parent directory of the target does not exist
    #[error("parent directory missing for {0} (enable create_parents to create it)")]
    MissingParent(PathBuf),

    /// IO error reading or writing the target
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApplyError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors while writing the run archive
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl AuditError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
