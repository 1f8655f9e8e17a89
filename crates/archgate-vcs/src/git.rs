//! Git command surface
//!
//! [`VersionControl`] is the narrow set of operations the gate needs from a
//! version-control backend. [`Git`] implements it by spawning `git` in the
//! repository root; every call blocks and captures exit code plus output.
//!
//! Hard operations return [`VcsError`]. Branch ensure and pushes are soft:
//! they return a [`SoftFailure`] instead.

use crate::error::{SoftFailure, VcsError};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured result of one `git` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// What a diff is taken against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffQuery {
    /// Base revision; `None` lets git pick its default
    pub against_ref: Option<String>,
    /// Diff the index instead of the worktree
    pub staged: bool,
    /// Restrict to these paths
    pub paths: Vec<String>,
}

impl Default for DiffQuery {
    fn default() -> Self {
        Self {
            against_ref: Some("HEAD".to_string()),
            staged: true,
            paths: Vec::new(),
        }
    }
}

impl DiffQuery {
    /// Worktree against HEAD, restricted to `paths`
    #[must_use]
    pub fn worktree_paths(paths: Vec<String>) -> Self {
        Self {
            against_ref: Some("HEAD".to_string()),
            staged: false,
            paths,
        }
    }

    fn args(&self, mode: &str) -> Vec<String> {
        let mut args = vec!["diff".to_string()];
        if self.staged {
            args.push("--staged".to_string());
        }
        match mode {
            "numstat" => args.push("--numstat".to_string()),
            _ => {
                args.push("--patch".to_string());
                args.push("--unified=0".to_string());
            }
        }
        if let Some(rev) = &self.against_ref {
            args.push(rev.clone());
        }
        if !self.paths.is_empty() {
            args.push("--".to_string());
            args.extend(self.paths.iter().cloned());
        }
        args
    }
}

/// Operations the gate needs from version control
pub trait VersionControl {
    /// Repository root all paths are relative to
    fn root(&self) -> &Path;

    /// Full id of HEAD
    fn resolve_head(&self) -> Result<String, VcsError>;

    /// Abbreviated id of a revision
    fn short_id(&self, rev: &str) -> Result<String, VcsError>;

    /// Current branch name (`HEAD` when detached)
    fn current_branch(&self) -> Result<String, VcsError>;

    /// Author name of the last commit
    fn last_author(&self) -> Result<String, VcsError>;

    /// Whether tracked files have no uncommitted changes
    fn is_clean(&self) -> Result<bool, VcsError>;

    fn checkout(&self, rev: &str) -> Result<(), VcsError>;

    /// Switch to `branch`, creating it if missing
    fn ensure_branch(&self, branch: &str) -> Result<(), SoftFailure>;

    /// Stage `paths` and commit; returns the new commit id
    fn stage_and_commit(&self, paths: &[String], message: &str) -> Result<String, VcsError>;

    fn push_branch(&self, remote: &str, branch: &str) -> Result<(), SoftFailure>;

    fn diff_numstat(&self, query: &DiffQuery) -> Result<String, VcsError>;

    fn diff_patch(&self, query: &DiffQuery) -> Result<String, VcsError>;

    /// Tags matching `pattern`, newest creator date first, ties by name descending
    fn list_tags(&self, pattern: &str) -> Result<Vec<String>, VcsError>;

    fn tag_exists(&self, tag: &str) -> Result<bool, VcsError>;

    /// Commit a tag points to
    fn resolve_tag(&self, tag: &str) -> Result<String, VcsError>;

    fn create_annotated_tag(&self, tag: &str, message: &str) -> Result<(), VcsError>;

    fn push_tag(&self, remote: &str, tag: &str) -> Result<(), SoftFailure>;

    fn merge_no_ff(&self, rev: &str, message: &str) -> Result<(), VcsError>;

    fn reset_hard(&self, rev: &str) -> Result<(), VcsError>;

    fn push_with_lease(&self, remote: &str) -> Result<(), SoftFailure>;

    /// Discard uncommitted changes on `paths`
    fn restore_paths(&self, paths: &[String]) -> Result<(), VcsError>;
}

/// `git` subprocess backend
#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Run `git <args>` and capture its output, whatever the exit code
    ///
    /// # Errors
    /// Returns [`VcsError::Spawn`] if the process cannot be started
    pub fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<GitOutput, VcsError> {
        let argv: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let command = argv.join(" ");
        tracing::debug!(cwd = %self.repo_root.display(), command = %command, "git");

        let output = Command::new("git")
            .args(&argv)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|source| VcsError::Spawn {
                command: command.clone(),
                source,
            })?;

        Ok(GitOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run `git <args>`, failing on a non-zero exit
    ///
    /// # Errors
    /// Returns [`VcsError::CommandFailed`] on a non-zero exit
    pub fn run_checked<S: AsRef<str>>(&self, args: &[S]) -> Result<String, VcsError> {
        let out = self.run(args)?;
        if out.success() {
            Ok(out.stdout)
        } else {
            let command: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
            Err(VcsError::failed(command.join(" "), out.code, out.stderr))
        }
    }

    fn run_soft<S: AsRef<str>>(&self, operation: &str, args: &[S]) -> Result<(), SoftFailure> {
        self.run_checked(args)
            .map(|_| ())
            .map_err(|e| SoftFailure::from_error(operation, &e))
    }

    fn single_line(&self, args: &[&str]) -> Result<String, VcsError> {
        let out = self.run_checked(args)?;
        let line = out.trim();
        if line.is_empty() {
            return Err(VcsError::UnexpectedOutput {
                command: args.join(" "),
                detail: "empty output".to_string(),
            });
        }
        Ok(line.to_string())
    }
}

impl VersionControl for Git {
    fn root(&self) -> &Path {
        &self.repo_root
    }

    fn resolve_head(&self) -> Result<String, VcsError> {
        self.single_line(&["rev-parse", "HEAD"])
    }

    fn short_id(&self, rev: &str) -> Result<String, VcsError> {
        self.single_line(&["rev-parse", "--short", rev])
    }

    fn current_branch(&self) -> Result<String, VcsError> {
        self.single_line(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn last_author(&self) -> Result<String, VcsError> {
        self.single_line(&["log", "-1", "--pretty=format:%an"])
    }

    fn is_clean(&self) -> Result<bool, VcsError> {
        let out = self.run_checked(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(out.trim().is_empty())
    }

    fn checkout(&self, rev: &str) -> Result<(), VcsError> {
        self.run_checked(&["checkout", rev]).map(|_| ())
    }

    fn ensure_branch(&self, branch: &str) -> Result<(), SoftFailure> {
        let exists = self
            .run(&["rev-parse", "--verify", "--quiet", branch])
            .map_err(|e| SoftFailure::from_error("ensure_branch", &e))?
            .success();
        if exists {
            self.run_soft("ensure_branch", &["checkout", branch])
        } else {
            self.run_soft("ensure_branch", &["checkout", "-b", branch])
        }
    }

    fn stage_and_commit(&self, paths: &[String], message: &str) -> Result<String, VcsError> {
        let mut add = vec!["add".to_string(), "--".to_string()];
        add.extend(paths.iter().cloned());
        self.run_checked(&add)?;
        self.run_checked(&["commit", "-m", message])?;
        self.resolve_head()
    }

    fn push_branch(&self, remote: &str, branch: &str) -> Result<(), SoftFailure> {
        self.run_soft("push_branch", &["push", "-u", remote, branch])
    }

    fn diff_numstat(&self, query: &DiffQuery) -> Result<String, VcsError> {
        self.run_checked(&query.args("numstat"))
    }

    fn diff_patch(&self, query: &DiffQuery) -> Result<String, VcsError> {
        self.run_checked(&query.args("patch"))
    }

    fn list_tags(&self, pattern: &str) -> Result<Vec<String>, VcsError> {
        // the last --sort key is primary; the name breaks same-second ties
        let out = self.run_checked(&[
            "tag",
            "-l",
            pattern,
            "--sort=-refname",
            "--sort=-creatordate",
        ])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn tag_exists(&self, tag: &str) -> Result<bool, VcsError> {
        let out = self.run_checked(&["tag", "-l", tag])?;
        Ok(out.lines().any(|l| l.trim() == tag))
    }

    fn resolve_tag(&self, tag: &str) -> Result<String, VcsError> {
        self.single_line(&["rev-list", "-n", "1", tag])
    }

    fn create_annotated_tag(&self, tag: &str, message: &str) -> Result<(), VcsError> {
        self.run_checked(&["tag", "-a", tag, "-m", message]).map(|_| ())
    }

    fn push_tag(&self, remote: &str, tag: &str) -> Result<(), SoftFailure> {
        self.run_soft("push_tag", &["push", remote, tag])
    }

    fn merge_no_ff(&self, rev: &str, message: &str) -> Result<(), VcsError> {
        self.run_checked(&["merge", "--no-ff", rev, "-m", message])
            .map(|_| ())
    }

    fn reset_hard(&self, rev: &str) -> Result<(), VcsError> {
        self.run_checked(&["reset", "--hard", rev]).map(|_| ())
    }

    fn push_with_lease(&self, remote: &str) -> Result<(), SoftFailure> {
        self.run_soft("push_with_lease", &["push", "--force-with-lease", remote, "HEAD"])
    }

    fn restore_paths(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["checkout".to_string(), "--".to_string()];
        args.extend(paths.iter().cloned());
        self.run_checked(&args).map(|_| ())
    }
}
