//! Green-state tagging and rollback
//!
//! A commit is "green" once it carries a `green-<YYYYMMDD>-<shortsha>` tag
//! and its reproducibility bundle sits in the archive directory:
//!
//! ```text
//! <repo>/.archcode/archive/patch_post_commit_<sha>.tar.gz
//! <repo>/.archcode/archive/metadata_<shortsha>.yaml
//! ```
//!
//! [`GreenManager::tag_green`] writes both and tags HEAD.
//! [`GreenManager::rollback_to_last_green`] restores the newest green commit.

use crate::archive;
use crate::error::{GreenError, SoftFailure};
use crate::git::{Git, VersionControl};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default archive directory, relative to the repository root
pub const DEFAULT_ARCHIVE_DIR: &str = ".archcode/archive";

/// Files bundled with a green snapshot when present
pub const DEFAULT_ARTIFACTS: &[&str] = &[
    "execution_plan.yaml",
    "plan_validated.yaml",
    "rollback_bundle.yaml",
    "Cargo.toml",
    "Cargo.lock",
    "requirements.txt",
    "requirements-dev.txt",
    "poetry.lock",
    "uv.lock",
    "pytest-report.xml",
    "test-results.xml",
    ".pytest_cache/lastfailed",
];

/// Governance documents a green snapshot refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRef {
    pub branching: String,
    pub commits: String,
    pub rollback: String,
}

impl Default for PolicyRef {
    fn default() -> Self {
        Self {
            branching: "docs/BRANCHING.md".into(),
            commits: "docs/COMMITS.md".into(),
            rollback: "docs/ROLLBACK.md".into(),
        }
    }
}

/// Metadata written next to, and inside, each bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenMetadata {
    pub sha: String,
    pub shortsha: String,
    pub branch: String,
    pub author: String,
    pub created_utc: String,
    pub archive: String,
    #[serde(default)]
    pub policy_ref: PolicyRef,
}

impl GreenMetadata {
    /// Read a metadata file; absent or unreadable files yield `None`
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        serde_yaml::from_str(&text).ok()
    }
}

/// Result of tagging a green commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreenRecord {
    pub tag: String,
    pub commit_id: String,
    pub short_id: String,
    pub archive_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Whether the tag push succeeded
    pub pushed: bool,
    pub soft_failures: Vec<SoftFailure>,
}

/// How the mainline is brought back to the green commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RollbackStrategy {
    /// `merge --no-ff` the green commit, then push
    #[default]
    Merge,
    /// `reset --hard` to the green commit, then push with lease
    Reset,
}

impl fmt::Display for RollbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merge => "merge",
            Self::Reset => "reset",
        })
    }
}

impl FromStr for RollbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "reset" => Ok(Self::Reset),
            other => Err(format!("unknown rollback strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackOptions {
    pub strategy: RollbackStrategy,
    /// Record planned commands without executing any
    pub dry_run: bool,
    pub skip_clean_check: bool,
}

/// What a rollback did (or would do)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub tag: String,
    pub commit_id: String,
    pub short_id: String,
    pub archive_path: PathBuf,
    pub metadata: Option<GreenMetadata>,
    pub strategy: RollbackStrategy,
    pub dry_run: bool,
    /// Mutating steps in order, executed unless `dry_run`
    pub commands: Vec<String>,
    pub soft_failures: Vec<SoftFailure>,
}

/// Tags green commits and restores them
#[derive(Debug, Clone)]
pub struct GreenManager<V: VersionControl = Git> {
    vcs: V,
    mainline: String,
    remote: String,
    archive_dir: PathBuf,
    artifacts: Vec<String>,
}

impl GreenManager<Git> {
    /// Manager for the repository at `repo_root`
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        Self::new(Git::new(repo_root))
    }
}

impl<V: VersionControl> GreenManager<V> {
    pub fn new(vcs: V) -> Self {
        Self {
            vcs,
            mainline: "main".into(),
            remote: "origin".into(),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            artifacts: DEFAULT_ARTIFACTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_mainline(mut self, mainline: impl Into<String>) -> Self {
        self.mainline = mainline.into();
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Archive directory, relative to the repository root
    #[must_use]
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    fn archive_root(&self) -> PathBuf {
        self.vcs.root().join(&self.archive_dir)
    }

    /// Bundle path for a full commit id
    #[must_use]
    pub fn archive_path(&self, commit_id: &str) -> PathBuf {
        self.archive_root()
            .join(format!("patch_post_commit_{commit_id}.tar.gz"))
    }

    /// Metadata path for a short commit id
    #[must_use]
    pub fn metadata_path(&self, short_id: &str) -> PathBuf {
        self.archive_root().join(format!("metadata_{short_id}.yaml"))
    }

    /// Tag name for a short id on a given day
    #[must_use]
    pub fn tag_name(now: DateTime<Utc>, short_id: &str) -> String {
        format!("green-{}-{short_id}", now.format("%Y%m%d"))
    }

    /// Snapshot and tag HEAD as green
    ///
    /// Refuses before writing anything if the bundle or the tag already
    /// exists. A failed bundle or tag step removes what was written, so the
    /// call can simply be repeated. The tag push is soft.
    ///
    /// # Errors
    /// [`GreenError::ArchiveExists`] or [`GreenError::TagExists`] on a repeat,
    /// otherwise VCS or IO errors.
    pub fn tag_green(&self, now: DateTime<Utc>) -> Result<GreenRecord, GreenError> {
        let root = self.vcs.root().to_path_buf();
        let commit_id = self.vcs.resolve_head()?;
        let short_id = self.vcs.short_id(&commit_id)?;

        let archive_path = self.archive_path(&commit_id);
        if archive_path.exists() {
            return Err(GreenError::ArchiveExists(archive_path));
        }
        let tag = Self::tag_name(now, &short_id);
        if self.vcs.tag_exists(&tag)? {
            return Err(GreenError::TagExists(tag));
        }

        let archive_root = self.archive_root();
        std::fs::create_dir_all(&archive_root)
            .map_err(|e| GreenError::io_error(&archive_root, e))?;

        let mut members: Vec<PathBuf> = self
            .artifacts
            .iter()
            .map(|rel| root.join(rel))
            .filter(|p| p.is_file())
            .collect();

        let metadata = GreenMetadata {
            sha: commit_id.clone(),
            shortsha: short_id.clone(),
            branch: self
                .vcs
                .current_branch()
                .unwrap_or_else(|_| "DETACHED_HEAD".into()),
            author: self.vcs.last_author().unwrap_or_default(),
            created_utc: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            archive: relative_display(&root, &archive_path),
            policy_ref: PolicyRef::default(),
        };
        let metadata_path = self.metadata_path(&short_id);
        std::fs::write(&metadata_path, serde_yaml::to_string(&metadata)?)
            .map_err(|e| GreenError::io_error(&metadata_path, e))?;
        members.push(metadata_path.clone());

        if let Err(err) = archive::bundle(&root, &archive_path, &members) {
            discard(&[metadata_path.as_path()]);
            return Err(err.into());
        }
        tracing::info!(
            archive = %archive_path.display(),
            members = members.len(),
            "green archive written"
        );

        // an archive without its tag would block every retry
        let date = now.format("%Y%m%d");
        if let Err(err) = self
            .vcs
            .create_annotated_tag(&tag, &format!("green build {date} ({short_id})"))
        {
            discard(&[archive_path.as_path(), metadata_path.as_path()]);
            return Err(err.into());
        }
        tracing::info!(tag = %tag, commit = %commit_id, "green tag created");

        let mut soft_failures = Vec::new();
        let pushed = match self.vcs.push_tag(&self.remote, &tag) {
            Ok(()) => true,
            Err(soft) => {
                soft_failures.push(soft);
                false
            }
        };

        Ok(GreenRecord {
            tag,
            commit_id,
            short_id,
            archive_path,
            metadata_path,
            pushed,
            soft_failures,
        })
    }

    /// Restore the newest green commit onto the mainline
    ///
    /// # Errors
    /// [`GreenError::DirtyTree`], [`GreenError::NoGreenTag`] and
    /// [`GreenError::MissingArchive`] for unmet preconditions (checked in
    /// that order), otherwise VCS or archive errors.
    pub fn rollback_to_last_green(
        &self,
        options: RollbackOptions,
    ) -> Result<RollbackReport, GreenError> {
        let root = self.vcs.root().to_path_buf();

        if !options.skip_clean_check && !self.vcs.is_clean()? {
            return Err(GreenError::DirtyTree);
        }

        let tag = self
            .vcs
            .list_tags("green-*")?
            .into_iter()
            .next()
            .ok_or(GreenError::NoGreenTag)?;
        let commit_id = self.vcs.resolve_tag(&tag)?;
        let short_id = self.vcs.short_id(&commit_id)?;
        tracing::info!(tag = %tag, commit = %commit_id, "last green");

        let archive_path = self.archive_path(&commit_id);
        if !archive_path.exists() {
            return Err(GreenError::MissingArchive(archive_path));
        }

        let metadata = GreenMetadata::read(&self.metadata_path(&short_id));
        match &metadata {
            Some(m) => tracing::info!(
                branch = %m.branch,
                author = %m.author,
                created_utc = %m.created_utc,
                "green metadata read"
            ),
            None => tracing::warn!("green metadata missing or unreadable, continuing"),
        }

        let mut report = RollbackReport {
            tag: tag.clone(),
            commit_id: commit_id.clone(),
            short_id,
            archive_path: archive_path.clone(),
            metadata,
            strategy: options.strategy,
            dry_run: options.dry_run,
            commands: Vec::new(),
            soft_failures: Vec::new(),
        };
        let dry = options.dry_run;

        step(&mut report, dry, format!("git checkout {commit_id}"), || {
            self.vcs.checkout(&commit_id).map_err(GreenError::from)
        })?;
        step(
            &mut report,
            dry,
            format!("extract {} -> {}", archive_path.display(), root.display()),
            || archive::extract(&archive_path, &root).map_err(GreenError::from),
        )?;
        step(&mut report, dry, format!("git checkout {}", self.mainline), || {
            self.vcs.checkout(&self.mainline).map_err(GreenError::from)
        })?;

        let (apply_cmd, push_cmd) = match options.strategy {
            RollbackStrategy::Merge => (
                format!("git merge --no-ff {commit_id} -m \"rollback: to {tag}\""),
                format!("git push -u {} HEAD", self.remote),
            ),
            RollbackStrategy::Reset => (
                format!("git reset --hard {commit_id}"),
                format!("git push --force-with-lease {} HEAD", self.remote),
            ),
        };
        step(&mut report, dry, apply_cmd, || match options.strategy {
            RollbackStrategy::Merge => self
                .vcs
                .merge_no_ff(&commit_id, &format!("rollback: to {tag}"))
                .map_err(GreenError::from),
            RollbackStrategy::Reset => self.vcs.reset_hard(&commit_id).map_err(GreenError::from),
        })?;

        report.commands.push(push_cmd.clone());
        if dry {
            tracing::info!(command = %push_cmd, "dry-run");
        } else {
            let pushed = match options.strategy {
                RollbackStrategy::Merge => self.vcs.push_branch(&self.remote, "HEAD"),
                RollbackStrategy::Reset => self.vcs.push_with_lease(&self.remote),
            };
            if let Err(soft) = pushed {
                report.soft_failures.push(soft);
            }
        }

        tracing::info!(tag = %tag, strategy = %options.strategy, dry_run = dry, "rollback finished");
        Ok(report)
    }
}

/// Record a mutating step, running it unless this is a dry run
fn step<F>(report: &mut RollbackReport, dry: bool, command: String, run: F) -> Result<(), GreenError>
where
    F: FnOnce() -> Result<(), GreenError>,
{
    if dry {
        tracing::info!(command = %command, "dry-run");
    } else {
        tracing::info!(command = %command, "rollback step");
        run()?;
    }
    report.commands.push(command);
    Ok(())
}

/// Best-effort removal of a half-written snapshot
fn discard(paths: &[&Path]) {
    for path in paths {
        if let Err(err) = std::fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %err, "could not remove partial green snapshot");
            }
        }
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tag_name_uses_utc_date() {
        let now = Utc.with_ymd_and_hms(2025, 8, 12, 23, 59, 0).unwrap();
        assert_eq!(
            GreenManager::<Git>::tag_name(now, "abc1234"),
            "green-20250812-abc1234"
        );
    }

    #[test]
    fn paths_follow_archive_layout() {
        let mgr = GreenManager::for_repo("/repo");
        assert_eq!(
            mgr.archive_path("deadbeef"),
            PathBuf::from("/repo/.archcode/archive/patch_post_commit_deadbeef.tar.gz")
        );
        assert_eq!(
            mgr.metadata_path("dead"),
            PathBuf::from("/repo/.archcode/archive/metadata_dead.yaml")
        );
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("RESET".parse::<RollbackStrategy>().unwrap(), RollbackStrategy::Reset);
        assert!("rebase".parse::<RollbackStrategy>().is_err());
    }

    #[test]
    fn metadata_yaml_shape() {
        let meta = GreenMetadata {
            sha: "abc".into(),
            shortsha: "a".into(),
            branch: "main".into(),
            author: "dev".into(),
            created_utc: "2025-08-12T00:00:00Z".into(),
            archive: ".archcode/archive/patch_post_commit_abc.tar.gz".into(),
            policy_ref: PolicyRef::default(),
        };
        let yaml = serde_yaml::to_string(&meta).unwrap();
        assert!(yaml.contains("rollback: docs/ROLLBACK.md"));
        let back: GreenMetadata = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, meta);
    }
}
