//! Error types for version control and green-state handling

use std::fmt;
use std::path::PathBuf;

/// Errors from running `git`
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// `git` could not be spawned
    #[error("failed to run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `git` exited non-zero
    #[error("git {command} exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Output could not be interpreted
    #[error("unexpected output from git {command}: {detail}")]
    UnexpectedOutput { command: String, detail: String },
}

impl VcsError {
    pub(crate) fn failed(command: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }
}

/// A non-blocking failure (branch ensure, push)
///
/// Returned as a value so that a single boundary decides how to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    /// Operation that failed, e.g. `push_tag`
    pub operation: String,
    /// Human-readable detail
    pub detail: String,
}

impl SoftFailure {
    pub fn new(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Downgrade a hard error to a soft failure
    pub fn from_error(operation: impl Into<String>, err: &VcsError) -> Self {
        Self::new(operation, err.to_string())
    }
}

impl fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (non-blocking): {}", self.operation, self.detail)
    }
}

/// Errors raised by bundle archives
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("io error on archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Member path is not under the bundle root
    #[error("archive member {0} is outside the repository root")]
    OutsideRoot(PathBuf),
}

impl ArchiveError {
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by green tagging and rollback
///
/// Rollback preconditions are distinct variants so that callers can map
/// them onto distinct exit codes via [`GreenError::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum GreenError {
    /// Tracked files have uncommitted changes
    #[error("working tree is not clean; commit or stash first, or skip the clean check")]
    DirtyTree,

    /// Archive for the tagged commit is absent
    #[error("archive missing: {0}")]
    MissingArchive(PathBuf),

    /// No `green-*` tag exists
    #[error("no green-* tag found")]
    NoGreenTag,

    /// Tag already exists for this commit and date
    #[error("tag already exists: {0}")]
    TagExists(String),

    /// Archive for this commit was already written
    #[error("archive already present: {0}")]
    ArchiveExists(PathBuf),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode green metadata: {0}")]
    Metadata(#[from] serde_yaml::Error),
}

impl GreenError {
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    ///
    /// 2 dirty tree, 3 missing archive, 4 missing or duplicate tag (or
    /// archive already present), 1 anything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DirtyTree => 2,
            Self::MissingArchive(_) => 3,
            Self::NoGreenTag | Self::TagExists(_) | Self::ArchiveExists(_) => 4,
            Self::Vcs(_) | Self::Archive(_) | Self::Io { .. } | Self::Metadata(_) => 1,
        }
    }
}
