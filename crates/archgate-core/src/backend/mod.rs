//! Backend operations the orchestrator dispatches to
//!
//! Exactly one of the three operations runs per envelope. Soft failures come
//! back inside [`BackendReport`]; the orchestrator is the single place that
//! reports them.

mod commit;
mod console;
mod git;

pub use commit::build_commit_message;
pub use console::ConsoleBackend;
pub use git::{GitBackend, RegenerationRequest, RollbackEntry, REGENERATION_QUEUE, ROLLBACK_BUNDLE};

use crate::decision::Decision;
use crate::error::BackendError;
use archgate_artifact::ChangeEnvelope;
use archgate_vcs::SoftFailure;

/// What a backend operation produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendReport {
    /// Commit created by an apply, if any
    pub commit_id: Option<String>,
    pub soft_failures: Vec<SoftFailure>,
}

impl BackendReport {
    pub(crate) fn soft(&mut self, result: Result<(), SoftFailure>) {
        if let Err(failure) = result {
            self.soft_failures.push(failure);
        }
    }
}

/// The three outcomes of a routed envelope
#[cfg_attr(test, mockall::automock)]
pub trait OrchestrationBackend {
    /// Write the envelope to disk and record it
    ///
    /// # Errors
    /// Hard failures abort the run
    fn apply_and_commit(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError>;

    /// Request targeted regeneration
    ///
    /// # Errors
    /// Hard failures abort the run
    fn regenerate(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError>;

    /// Discard the envelope and log it
    ///
    /// # Errors
    /// Hard failures abort the run
    fn rollback_and_log(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError>;
}

/// Target path for bookkeeping: block-resolved, else `meta.target`
pub(crate) fn target_of(envelope: &ChangeEnvelope) -> Option<String> {
    envelope
        .block()
        .ok()
        .and_then(|block| envelope.resolve_target(&block).ok())
        .or_else(|| envelope.meta.target.clone())
        .filter(|t| !t.trim().is_empty())
}
