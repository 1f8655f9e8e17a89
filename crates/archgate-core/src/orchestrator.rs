//! Orchestrated run of one envelope
//!
//! # Workflow
//! 1. Snapshot the envelope as received (`patch_before.yaml`)
//! 2. Run the upstream checkers, then route
//! 3. Snapshot the decision and the annotated envelope
//! 4. Gate an `apply` through the policy engine when a gate is supplied
//! 5. Dispatch exactly one backend operation
//! 6. Report soft failures; snapshot `patch_post_commit.yaml` after a commit
//!
//! Archive writes are best-effort: a failure is logged and the run goes on.

use crate::backend::{BackendReport, OrchestrationBackend};
use crate::checker::Checker;
use crate::config::GateConfig;
use crate::decision::{Action, Decision};
use crate::error::OrchestratorError;
use crate::error_policy::action_for_error;
use crate::router::DecisionRouter;
use archgate_artifact::{ChangeEnvelope, DiffStats, ErrorCategory};
use archgate_constitutional::RunArchive;
use archgate_policy::{PolicyEngine, PolicyMode, PolicyVerdict};
use archgate_vcs::SoftFailure;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PATCH_BEFORE: &str = "patch_before.yaml";
pub const DECISION: &str = "decision.yaml";
pub const PATCH_AFTER: &str = "patch_after.yaml";
pub const PATCH_POST_COMMIT: &str = "patch_post_commit.yaml";

/// Inputs for gating an `apply`
#[derive(Debug, Clone, Copy)]
pub struct PolicyGate<'a> {
    pub engine: &'a PolicyEngine,
    pub diffstats: &'a DiffStats,
    pub branch: Option<&'a str>,
    /// `partial_ok` changes already accepted in this run
    pub partial_count: u32,
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The envelope with checker annotations and backend history
    pub envelope: ChangeEnvelope,
    /// The router's decision, unchanged by the policy gate
    pub decision: Decision,
    /// The operation actually dispatched
    pub dispatched: Action,
    pub verdict: Option<PolicyVerdict>,
    pub soft_failures: Vec<SoftFailure>,
}

impl RunOutcome {
    /// Whether the policy gate overrode an `apply`
    #[must_use]
    pub fn blocked(&self) -> bool {
        self.decision.action() == Action::Apply && self.dispatched != Action::Apply
    }
}

/// Ties checkers, router, policy gate and backend together
pub struct Orchestrator {
    router: DecisionRouter,
    checkers: Vec<Box<dyn Checker>>,
    archive_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("router", &self.router)
            .field(
                "checkers",
                &self.checkers.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("archive_dir", &self.archive_dir)
            .finish()
    }
}

impl Orchestrator {
    /// Orchestrator without checkers or run archive
    #[must_use]
    pub fn new(router: DecisionRouter) -> Self {
        Self {
            router,
            checkers: Vec::new(),
            archive_dir: None,
        }
    }

    /// Router mode and run archive taken from `config`
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(DecisionRouter::new(config.router_mode)).with_archive_dir(config.run_dir())
    }

    #[must_use]
    pub fn with_checker(mut self, checker: Box<dyn Checker>) -> Self {
        self.checkers.push(checker);
        self
    }

    #[must_use]
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn archive_dir(&self) -> Option<&Path> {
        self.archive_dir.as_deref()
    }

    /// Process one envelope end to end
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] if a checker cannot run or the backend
    /// reports a hard failure. Policy blocks are not errors: see
    /// [`RunOutcome::blocked`].
    pub fn run(
        &self,
        mut envelope: ChangeEnvelope,
        backend: &mut dyn OrchestrationBackend,
        gate: Option<PolicyGate<'_>>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let mut audit = Audit::open(self.archive_dir.as_deref());
        audit.run_info(&envelope, self.router.mode());
        audit.snapshot(PATCH_BEFORE, &envelope);
        audit.console(&format!("[arch] received envelope {}", envelope.id()));

        for checker in &self.checkers {
            checker.check(&mut envelope)?;
        }
        let decision = self.router.route(&envelope);
        tracing::info!(
            envelope = %envelope.id(),
            action = %decision.action(),
            summary = %decision.summary(),
            "decision"
        );
        audit.snapshot(DECISION, &decision);
        audit.snapshot(PATCH_AFTER, &envelope);
        audit.console(&format!("[arch] {}", decision.summary()));

        let mut dispatched = decision.action();
        let mut verdict = None;
        if let (Action::Apply, Some(gate)) = (decision.action(), gate) {
            let result = gate.engine.evaluate(
                &envelope,
                gate.diffstats,
                gate.branch,
                gate.partial_count,
            );
            if !result.ok {
                dispatched = action_for_error(ErrorCategory::PolicyViolation, gate.engine.mode());
                let label = if dispatched == Action::Rollback {
                    "BLOCKED"
                } else {
                    "RETRY"
                };
                tracing::warn!(
                    envelope = %envelope.id(),
                    violations = %result.summary(),
                    dispatched = %dispatched,
                    "policy blocked apply"
                );
                audit.console(&format!("[policy] {label}: {}", result.messages().join(" | ")));
            } else if result.has_violations() {
                tracing::warn!(
                    envelope = %envelope.id(),
                    violations = %result.summary(),
                    mode = %gate.engine.mode(),
                    "policy violations not enforced"
                );
                if gate.engine.mode() == PolicyMode::Warn {
                    audit.console(&format!("[policy] WARN: {}", result.messages().join(" | ")));
                }
            }
            verdict = Some(result);
        }

        let (operation, result) = match dispatched {
            Action::Apply => (
                "apply_and_commit",
                backend.apply_and_commit(&mut envelope, &decision),
            ),
            Action::Retry => ("regenerate", backend.regenerate(&mut envelope, &decision)),
            Action::Rollback => (
                "rollback_and_log",
                backend.rollback_and_log(&mut envelope, &decision),
            ),
        };
        let report = match result {
            Ok(report) => report,
            Err(source) if !source.is_hard() => BackendReport {
                commit_id: None,
                soft_failures: vec![SoftFailure::new(operation, source.to_string())],
            },
            Err(source) => {
                tracing::error!(envelope = %envelope.id(), operation, error = %source, "run aborted");
                audit.console(&format!("[arch] ABORTED: {operation}: {source}"));
                return Err(OrchestratorError::Backend { operation, source });
            }
        };

        for failure in &report.soft_failures {
            tracing::warn!(
                envelope = %envelope.id(),
                operation = %failure.operation,
                detail = %failure.detail,
                "non-blocking failure"
            );
            audit.console(&format!("[warn] {failure}"));
        }

        if dispatched == Action::Apply && envelope.meta.commit_id().is_some() {
            audit.snapshot(PATCH_POST_COMMIT, &envelope);
        }
        audit.console(&format!("[arch] dispatched {dispatched} via {operation}"));

        Ok(RunOutcome {
            envelope,
            decision,
            dispatched,
            verdict,
            soft_failures: report.soft_failures,
        })
    }
}

/// Best-effort wrapper over [`RunArchive`]
struct Audit {
    archive: Option<RunArchive>,
}

impl Audit {
    fn open(dir: Option<&Path>) -> Self {
        let archive = dir.and_then(|dir| match RunArchive::open(dir) {
            Ok(archive) => Some(archive),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "run archive unavailable");
                None
            }
        });
        Self { archive }
    }

    fn snapshot<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) {
        if let Some(archive) = &mut self.archive {
            if let Err(err) = archive.write_yaml(name, value) {
                tracing::warn!(file = name, error = %err, "snapshot not written");
            }
        }
    }

    fn console(&mut self, line: &str) {
        if let Some(archive) = &mut self.archive {
            if let Err(err) = archive.append_console(line) {
                tracing::warn!(error = %err, "console line not written");
            }
        }
    }

    fn run_info(&mut self, envelope: &ChangeEnvelope, mode: PolicyMode) {
        if let Some(archive) = &mut self.archive {
            let info = BTreeMap::from([
                ("run_id".to_string(), format!("RUN-{}", uuid::Uuid::new_v4().simple())),
                ("envelope_id".to_string(), envelope.id().to_string()),
                ("router_mode".to_string(), mode.to_string()),
                (
                    "started_utc".to_string(),
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                ),
            ]);
            if let Err(err) = archive.write_run_info(&info) {
                tracing::warn!(error = %err, "run info not written");
            }
        }
    }
}
