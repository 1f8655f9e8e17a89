//! Git-backed operations
//!
//! Apply writes through [`PatchApplier`] and commits on the working branch.
//! Retry and rollback never commit: they append to a YAML list on disk so
//! the next stage can pick them up.

use super::{build_commit_message, target_of, BackendReport, OrchestrationBackend};
use crate::config::GateConfig;
use crate::decision::Decision;
use crate::error::BackendError;
use archgate_artifact::{ChangeEnvelope, DiffStats, FileStat};
use archgate_constitutional::{ApplyAction, ApplyError, ApplyOutcome, PatchApplier};
use archgate_vcs::{DiffStatsCollector, Git, SoftFailure, VersionControl};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Retry requests, relative to the repository root
pub const REGENERATION_QUEUE: &str = ".archcode/regeneration_queue.yaml";
/// Rolled-back envelopes, relative to the repository root
pub const ROLLBACK_BUNDLE: &str = "rollback_bundle.yaml";

/// One entry of the regeneration queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationRequest {
    pub envelope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_line_id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub requested_at: String,
}

/// One entry of the rollback bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub envelope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_trace: Option<String>,
    /// Whether uncommitted changes on the target were discarded
    pub restored: bool,
    pub logged_at: String,
}

/// Applies envelopes and commits them through a [`VersionControl`] backend
#[derive(Debug)]
pub struct GitBackend<V: VersionControl = Git> {
    vcs: V,
    applier: PatchApplier,
    branch: String,
    remote: String,
    push: bool,
    queue_path: PathBuf,
    bundle_path: PathBuf,
}

impl GitBackend<Git> {
    /// Backend for `config.repo_root` with the configured branch and push settings
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(Git::new(&config.repo_root))
            .with_branch(&config.branch)
            .with_remote(&config.remote)
            .with_push(config.push)
            .with_create_parents(config.create_parents)
    }
}

impl<V: VersionControl> GitBackend<V> {
    pub fn new(vcs: V) -> Self {
        let root = vcs.root().to_path_buf();
        Self {
            applier: PatchApplier::new(&root).with_create_parents(true),
            branch: "archcode-self/preview".into(),
            remote: "origin".into(),
            push: false,
            queue_path: root.join(REGENERATION_QUEUE),
            bundle_path: root.join(ROLLBACK_BUNDLE),
            vcs,
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    #[must_use]
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    #[must_use]
    pub fn with_create_parents(mut self, create: bool) -> Self {
        self.applier = self.applier.with_create_parents(create);
        self
    }

    #[must_use]
    pub fn with_queue_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.queue_path = path.into();
        self
    }

    #[must_use]
    pub fn with_bundle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bundle_path = path.into();
        self
    }

    #[must_use]
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    #[must_use]
    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    #[must_use]
    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    /// Stats for the target after the write; falls back to the apply outcome
    /// when git does not see the file yet (new, untracked)
    fn diff_for(&self, outcome: &ApplyOutcome) -> DiffStats {
        let collected = DiffStatsCollector::new(&self.vcs).for_paths(&[outcome.target.clone()]);
        match collected {
            Ok(stats) if stats.files_changed > 0 => stats,
            Ok(_) | Err(_) => {
                let added = std::fs::read_to_string(&outcome.path)
                    .map(|text| text.lines().count() as u64)
                    .unwrap_or_default();
                DiffStats::from_files(
                    vec![FileStat {
                        path: outcome.target.clone(),
                        added,
                        deleted: 0,
                    }],
                    false,
                    outcome.bytes_written,
                )
            }
        }
    }
}

impl<V: VersionControl> OrchestrationBackend for GitBackend<V> {
    fn apply_and_commit(
        &mut self,
        envelope: &mut ChangeEnvelope,
        _decision: &Decision,
    ) -> Result<BackendReport, BackendError> {
        let mut report = BackendReport::default();

        // malformed envelopes fail before the branch moves
        let block = envelope.block().map_err(ApplyError::from)?;
        envelope.resolve_target(&block).map_err(ApplyError::from)?;

        match self.vcs.resolve_head() {
            Ok(sha) => envelope.append_history(format!("git:previous_sha={sha}")),
            Err(err) => {
                tracing::debug!(error = %err, "HEAD not resolvable");
                envelope.append_history("git:previous_sha=UNKNOWN");
            }
        }

        report.soft(self.vcs.ensure_branch(&self.branch));

        let outcome = self.applier.apply(envelope)?;
        if outcome.action == ApplyAction::Skip {
            tracing::info!(
                envelope = %envelope.id(),
                file = %outcome.target,
                "content unchanged, nothing to commit"
            );
            envelope.append_history(format!("git:commit_skipped file={}", outcome.target));
            return Ok(report);
        }

        let diff = self.diff_for(&outcome);
        let message = build_commit_message(envelope, Some(&diff), None);
        let sha = self
            .vcs
            .stage_and_commit(std::slice::from_ref(&outcome.target), &message)?;
        tracing::info!(
            envelope = %envelope.id(),
            commit = %sha,
            branch = %self.branch,
            "envelope committed"
        );
        envelope.append_history(format!("git:commit_sha={sha}"));
        envelope.meta.commit_id = Some(sha.clone());
        report.commit_id = Some(sha);

        if self.push {
            report.soft(self.vcs.push_branch(&self.remote, &self.branch));
        }
        Ok(report)
    }

    fn regenerate(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError> {
        let request = RegenerationRequest {
            envelope_id: envelope.id().to_string(),
            target: target_of(envelope),
            plan_line_id: envelope.meta.plan_line_id.clone(),
            summary: decision.summary().to_string(),
            reasons: decision.reasons().to_vec(),
            requested_at: now(),
        };
        append_entry(&self.queue_path, &request)?;
        tracing::info!(
            envelope = %envelope.id(),
            queue = %self.queue_path.display(),
            "regeneration requested"
        );
        envelope.append_history("retry:queued");
        Ok(BackendReport::default())
    }

    fn rollback_and_log(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError> {
        let mut report = BackendReport::default();
        let target = target_of(envelope);

        let restored = match &target {
            Some(path) => match self.vcs.restore_paths(std::slice::from_ref(path)) {
                Ok(()) => true,
                Err(err) => {
                    report
                        .soft_failures
                        .push(SoftFailure::from_error("restore_paths", &err));
                    false
                }
            },
            None => false,
        };

        let entry = RollbackEntry {
            envelope_id: envelope.id().to_string(),
            target,
            summary: decision.summary().to_string(),
            reasons: decision.reasons().to_vec(),
            error_trace: envelope.error_trace().map(str::to_string),
            restored,
            logged_at: now(),
        };
        append_entry(&self.bundle_path, &entry)?;
        tracing::info!(envelope = %envelope.id(), restored, "envelope rolled back");
        envelope.append_history(format!("rollback:logged restored={restored}"));
        Ok(report)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Append `entry` to the YAML list at `path`, creating it if needed
fn append_entry<T>(path: &Path, entry: &T) -> Result<(), BackendError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let mut entries: Vec<T> = match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Vec::new(),
        Ok(text) => serde_yaml::from_str(&text).map_err(|e| BackendError::bookkeeping(path, e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(BackendError::bookkeeping(path, e)),
    };
    entries.push(entry.clone());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BackendError::bookkeeping(parent, e))?;
    }
    let text = serde_yaml::to_string(&entries).map_err(|e| BackendError::bookkeeping(path, e))?;
    std::fs::write(path, text).map_err(|e| BackendError::bookkeeping(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::DecisionRouter;
    use archgate_artifact::{GlobalStatus, NextAction};
    use archgate_test_utils::{accepted_envelope, annotated_envelope, hello_payload, TempRepo};
    use pretty_assertions::assert_eq;

    fn backend(repo: &TempRepo) -> GitBackend<Git> {
        GitBackend::new(Git::new(repo.path()))
    }

    #[test]
    fn apply_commits_on_working_branch() {
        let repo = TempRepo::new();
        let before = repo.head();
        let mut env = accepted_envelope("app/hello.py", &hello_payload("def hello(): pass"));
        let decision = DecisionRouter::default().route(&env);

        let report = backend(&repo).apply_and_commit(&mut env, &decision).unwrap();

        let sha = report.commit_id.clone().unwrap();
        assert_eq!(repo.head(), sha);
        assert_eq!(env.meta.commit_id(), Some(sha.as_str()));
        assert_eq!(
            repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]),
            "archcode-self/preview"
        );
        assert!(report.soft_failures.is_empty());

        let history = env.history();
        assert_eq!(history[0], format!("git:previous_sha={before}"));
        assert!(history[1].starts_with("fs:insert markers"));
        assert_eq!(history[2], format!("git:commit_sha={sha}"));

        let subject = repo.git(&["log", "-1", "--format=%s"]);
        assert_eq!(subject, "feat(mARCH): PL-0001 implementer app");
        let body = repo.git(&["log", "-1", "--format=%b"]);
        assert!(body.contains("blast_radius=files=1"));
    }

    #[test]
    fn unchanged_content_is_not_committed() {
        let repo = TempRepo::new();
        let mut git = backend(&repo);
        let payload = hello_payload("def hello(): pass");

        let mut first = accepted_envelope("app/hello.py", &payload);
        let decision = DecisionRouter::default().route(&first);
        git.apply_and_commit(&mut first, &decision).unwrap();
        let head = repo.head();

        let mut second = accepted_envelope("app/hello.py", &payload);
        let report = git.apply_and_commit(&mut second, &decision).unwrap();
        assert_eq!(report.commit_id, None);
        assert_eq!(repo.head(), head);
        assert_eq!(second.meta.commit_id(), None);
        assert!(second
            .history()
            .last()
            .unwrap()
            .starts_with("git:commit_skipped"));
    }

    #[test]
    fn push_without_remote_is_soft() {
        let repo = TempRepo::new();
        let mut git = backend(&repo).with_push(true);
        let mut env = accepted_envelope("app/hello.py", &hello_payload("def hello(): pass"));
        let decision = DecisionRouter::default().route(&env);

        let report = git.apply_and_commit(&mut env, &decision).unwrap();
        assert!(report.commit_id.is_some());
        assert_eq!(report.soft_failures.len(), 1);
        assert_eq!(report.soft_failures[0].operation, "push_branch");
    }

    #[test]
    fn retry_appends_to_queue() {
        let repo = TempRepo::new();
        let mut git = backend(&repo);
        for _ in 0..2 {
            let mut env = annotated_envelope(
                "app/hello.py",
                &hello_payload("def hello(): pass"),
                GlobalStatus::PartialOk,
                NextAction::Retry,
            );
            env.meta.module_comment = Some("missing test | naming".into());
            let decision = DecisionRouter::default().route(&env);
            git.regenerate(&mut env, &decision).unwrap();
        }

        let text = std::fs::read_to_string(repo.join(REGENERATION_QUEUE)).unwrap();
        let queue: Vec<RegenerationRequest> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].target.as_deref(), Some("app/hello.py"));
        assert_eq!(queue[0].reasons, ["missing test", "naming"]);
        assert_eq!(queue[0].plan_line_id.as_deref(), Some("PL-0001"));
    }

    #[test]
    fn rollback_restores_tracked_target() {
        let repo = TempRepo::new();
        repo.write("app/hello.py", "original\n");
        repo.commit_all("add hello");
        repo.write("app/hello.py", "scribbled\n");

        let mut env = annotated_envelope(
            "app/hello.py",
            &hello_payload("def hello(): pass"),
            GlobalStatus::Rejected,
            NextAction::Rollback,
        );
        let decision = DecisionRouter::default().route(&env);
        let report = backend(&repo).rollback_and_log(&mut env, &decision).unwrap();

        assert!(report.soft_failures.is_empty());
        assert_eq!(repo.read("app/hello.py"), "original\n");
        let bundle: Vec<RollbackEntry> =
            serde_yaml::from_str(&repo.read(ROLLBACK_BUNDLE)).unwrap();
        assert_eq!(bundle.len(), 1);
        assert!(bundle[0].restored);
        assert_eq!(env.history(), ["rollback:logged restored=true"]);
    }

    #[test]
    fn rollback_of_untracked_target_is_soft() {
        let repo = TempRepo::new();
        let mut env = annotated_envelope(
            "app/new.py",
            &hello_payload("x"),
            GlobalStatus::Rejected,
            NextAction::Rollback,
        );
        let decision = DecisionRouter::default().route(&env);
        let report = backend(&repo).rollback_and_log(&mut env, &decision).unwrap();

        assert_eq!(report.soft_failures.len(), 1);
        assert_eq!(report.soft_failures[0].operation, "restore_paths");
        let bundle: Vec<RollbackEntry> =
            serde_yaml::from_str(&repo.read(ROLLBACK_BUNDLE)).unwrap();
        assert!(!bundle[0].restored);
    }

    #[test]
    fn unreadable_queue_is_bookkeeping_error() {
        let repo = TempRepo::new();
        repo.write(REGENERATION_QUEUE, "{ not: [a list");
        let mut env = annotated_envelope(
            "app/hello.py",
            &hello_payload("x"),
            GlobalStatus::PartialOk,
            NextAction::Retry,
        );
        let decision = DecisionRouter::default().route(&env);
        let err = backend(&repo).regenerate(&mut env, &decision).unwrap_err();
        assert!(!err.is_hard());
    }
}
