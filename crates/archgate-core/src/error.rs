//! Error types for ArchGate Core
//!
//! - [`BackendError`]: a backend operation failed
//! - [`OrchestratorError`]: a run was aborted
//! - [`CheckerError`] / [`NormalizeError`]: upstream seams
//! - [`ConfigError`]: gate configuration could not be loaded

use archgate_constitutional::ApplyError;
use archgate_policy::PolicyError;
use archgate_vcs::VcsError;
use std::path::PathBuf;

/// Errors raised by an [`OrchestrationBackend`](crate::OrchestrationBackend)
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The envelope could not be written to its target
    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),

    /// A blocking VCS step (commit, restore) failed
    #[error("vcs failed: {0}")]
    Vcs(#[from] VcsError),

    /// A side record (regeneration queue, rollback bundle) could not be written
    #[error("failed to update {path}: {detail}")]
    Bookkeeping { path: PathBuf, detail: String },
}

impl BackendError {
    /// Whether the run must abort
    ///
    /// Bookkeeping failures leave the working tree consistent and are
    /// reported like soft failures.
    #[inline]
    #[must_use]
    pub fn is_hard(&self) -> bool {
        !matches!(self, Self::Bookkeeping { .. })
    }

    pub(crate) fn bookkeeping(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Self::Bookkeeping {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

/// An upstream checker could not run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("checker {checker} failed: {message}")]
pub struct CheckerError {
    pub checker: String,
    pub message: String,
}

impl CheckerError {
    pub fn new(checker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            checker: checker.into(),
            message: message.into(),
        }
    }
}

/// A reason normalizer gave up; the router falls back to its own splitter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reason normalizer failed: {0}")]
pub struct NormalizeError(pub String);

/// Errors that abort an orchestrated run
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Checker(#[from] CheckerError),

    #[error("backend {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
}

/// Errors loading [`GateConfig`](crate::GateConfig)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode gate config: {0}")]
    Decode(#[from] serde_yaml::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}
