//! Subcommand implementations
//!
//! Each command writes its human-readable report to `out` and returns an
//! exit code from [`crate::exit`]. Only failures without a dedicated code
//! surface as `Err`.

use crate::exit;
use anyhow::Context;
use archgate_artifact::{ChangeEnvelope, DiffStats, FileStat, Sentinels};
use archgate_core::{
    Action, ConsoleBackend, GateConfig, GitBackend, OrchestrationBackend, Orchestrator,
    PolicyGate, RunOutcome, SentinelChecker,
};
use archgate_policy::{PolicyEngine, PolicySpec};
use archgate_vcs::{
    DiffStatsCollector, Git, GreenError, GreenManager, RollbackOptions, VersionControl,
};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;

/// Arguments of `archgate apply`
#[derive(Debug, Clone, Default)]
pub struct ApplyArgs {
    pub envelope: PathBuf,
    /// Overrides the configured `policy_path`
    pub policy: Option<PathBuf>,
    /// Overrides the configured working branch
    pub branch: Option<String>,
    pub partial_count: u32,
    /// Use the git backend; otherwise decisions are only logged
    pub commit: bool,
}

/// Route one envelope file and dispatch the decision
///
/// Exit codes: [`exit::OK`] when the decision was dispatched as routed,
/// [`exit::BLOCKED`] when the policy gate overrode an apply.
///
/// # Errors
/// Returns an error if the envelope or policy cannot be loaded, a checker
/// cannot run, or the backend fails hard.
pub fn apply(config: &GateConfig, args: &ApplyArgs, out: &mut dyn Write) -> anyhow::Result<i32> {
    let envelope = ChangeEnvelope::load(&args.envelope)
        .with_context(|| format!("loading envelope {}", args.envelope.display()))?;

    let policy = match &args.policy {
        Some(path) => Some(
            PolicySpec::load(path).with_context(|| format!("loading policy {}", path.display()))?,
        ),
        None => config.load_policy()?,
    };

    let mut config = config.clone();
    if let Some(branch) = &args.branch {
        config.branch.clone_from(branch);
    }
    if let Some(spec) = &policy {
        config.router_mode = spec.mode;
    }

    let sentinels = policy
        .as_ref()
        .map(|spec| spec.markers.sentinels())
        .unwrap_or_default();
    let engine = policy.map(PolicyEngine::new).transpose()?;

    let git = Git::new(&config.repo_root);
    let diffstats = match &engine {
        Some(_) => preview_diffstats(&git, &envelope, &sentinels),
        None => DiffStats::default(),
    };
    let gate = engine.as_ref().map(|engine| PolicyGate {
        engine,
        diffstats: &diffstats,
        branch: Some(config.branch.as_str()),
        partial_count: args.partial_count,
    });

    let orchestrator =
        Orchestrator::from_config(&config).with_checker(Box::new(SentinelChecker::new(sentinels)));
    let mut backend: Box<dyn OrchestrationBackend> = if args.commit {
        Box::new(GitBackend::from_config(&config))
    } else {
        Box::new(ConsoleBackend::new())
    };

    let outcome = orchestrator.run(envelope, backend.as_mut(), gate)?;
    report_outcome(&outcome, out)?;

    Ok(if outcome.blocked() {
        exit::BLOCKED
    } else {
        exit::OK
    })
}

/// Blast radius of an envelope before it is applied
///
/// Uses the working-tree diff of the target when git reports one. An
/// untouched or untracked target falls back to the block itself: one
/// file, every payload and marker line added.
pub fn preview_diffstats<V: VersionControl>(
    vcs: &V,
    envelope: &ChangeEnvelope,
    sentinels: &Sentinels,
) -> DiffStats {
    let Ok(block) = envelope.block_with(sentinels) else {
        return DiffStats::default();
    };
    let Ok(target) = envelope.resolve_target(&block) else {
        return DiffStats::default();
    };

    match DiffStatsCollector::new(vcs).for_paths(&[target.clone()]) {
        Ok(stats) if stats.files_changed > 0 => return stats,
        Ok(_) => {}
        Err(err) => {
            tracing::debug!(target = %target, error = %err, "diff stats unavailable, using payload");
        }
    }

    let payload = block.payload();
    let marker_lines = if block.markers().is_some() { 2 } else { 0 };
    DiffStats::from_files(
        vec![FileStat {
            path: target,
            added: payload.lines().count() as u64 + marker_lines,
            deleted: 0,
        }],
        false,
        payload.len() as u64,
    )
}

fn report_outcome(outcome: &RunOutcome, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "envelope: {}", outcome.envelope.id())?;
    writeln!(out, "decision: {}", outcome.decision.summary())?;
    if outcome.blocked() {
        writeln!(out, "dispatched: {} (policy override)", outcome.dispatched)?;
    } else {
        writeln!(out, "dispatched: {}", outcome.dispatched)?;
    }
    if let Some(verdict) = &outcome.verdict {
        for message in verdict.messages() {
            writeln!(out, "policy: {message}")?;
        }
    }
    if outcome.dispatched == Action::Apply {
        if let Some(commit) = outcome.envelope.meta.commit_id() {
            writeln!(out, "commit: {commit}")?;
        }
    }
    for failure in &outcome.soft_failures {
        writeln!(out, "warning: {failure}")?;
    }
    Ok(())
}

/// Archive and tag HEAD as green
///
/// # Errors
/// Returns an error only if writing the report fails; green-state errors
/// map to their exit codes.
pub fn tag_green(
    config: &GateConfig,
    now: DateTime<Utc>,
    out: &mut dyn Write,
) -> anyhow::Result<i32> {
    let manager = GreenManager::for_repo(&config.repo_root)
        .with_mainline(config.mainline.as_str())
        .with_remote(config.remote.as_str());

    let record = match manager.tag_green(now) {
        Ok(record) => record,
        Err(err) => return green_failure(&err, out),
    };

    writeln!(out, "tag: {}", record.tag)?;
    writeln!(out, "commit: {}", record.commit_id)?;
    writeln!(out, "archive: {}", record.archive_path.display())?;
    writeln!(out, "metadata: {}", record.metadata_path.display())?;
    writeln!(out, "pushed: {}", record.pushed)?;
    for failure in &record.soft_failures {
        tracing::warn!(operation = %failure.operation, detail = %failure.detail, "non-blocking failure");
        writeln!(out, "warning: {failure}")?;
    }
    Ok(exit::OK)
}

/// Restore the newest green tag
///
/// # Errors
/// Returns an error only if writing the report fails; green-state errors
/// map to their exit codes.
pub fn rollback_green(
    config: &GateConfig,
    options: RollbackOptions,
    out: &mut dyn Write,
) -> anyhow::Result<i32> {
    let manager = GreenManager::for_repo(&config.repo_root)
        .with_mainline(config.mainline.as_str())
        .with_remote(config.remote.as_str());

    let report = match manager.rollback_to_last_green(options) {
        Ok(report) => report,
        Err(err) => return green_failure(&err, out),
    };

    writeln!(out, "tag: {}", report.tag)?;
    writeln!(out, "commit: {}", report.commit_id)?;
    writeln!(out, "archive: {}", report.archive_path.display())?;
    match &report.metadata {
        Some(meta) => writeln!(
            out,
            "metadata: branch={} author={} created={}",
            meta.branch, meta.author, meta.created_utc
        )?,
        None => writeln!(out, "metadata: unavailable")?,
    }
    let verb = if report.dry_run { "plan" } else { "ran" };
    writeln!(out, "strategy: {}", report.strategy)?;
    for command in &report.commands {
        writeln!(out, "{verb}: {command}")?;
    }
    for failure in &report.soft_failures {
        tracing::warn!(operation = %failure.operation, detail = %failure.detail, "non-blocking failure");
        writeln!(out, "warning: {failure}")?;
    }
    Ok(exit::OK)
}

fn green_failure(err: &GreenError, out: &mut dyn Write) -> anyhow::Result<i32> {
    tracing::error!(error = %err, "green operation failed");
    writeln!(out, "error: {err}")?;
    Ok(err.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archgate_test_utils::{hello_payload, TempRepo};
    use pretty_assertions::assert_eq;

    #[test]
    fn preview_falls_back_to_payload_for_new_files() {
        let repo = TempRepo::new();
        let env = ChangeEnvelope::new(hello_payload("def hello(): pass"));
        let stats = preview_diffstats(&Git::new(repo.path()), &env, &Sentinels::default());

        assert_eq!(stats.paths, ["app/hello.py"]);
        assert_eq!(stats.files_changed, 1);
        // both markers plus the body
        assert_eq!(stats.loc_added, 3);
        assert_eq!(stats.loc_deleted, 0);
    }

    #[test]
    fn preview_uses_worktree_diff_when_present() {
        let repo = TempRepo::new();
        repo.write("app/hello.py", "a\n");
        repo.commit_all("seed");
        repo.write("app/hello.py", "b\n");

        let env = ChangeEnvelope::new(hello_payload("def hello(): pass"));
        let stats = preview_diffstats(&Git::new(repo.path()), &env, &Sentinels::default());
        assert_eq!(stats.loc_added, 1);
        assert_eq!(stats.loc_deleted, 1);
    }

    #[test]
    fn preview_of_malformed_envelope_is_empty() {
        let repo = TempRepo::new();
        let env = ChangeEnvelope::new("no sentinels here");
        let stats = preview_diffstats(&Git::new(repo.path()), &env, &Sentinels::default());
        assert_eq!(stats, DiffStats::default());
    }
}
