//! ArchGate Version Control
//!
//! The narrow interface between the gate and git.
//!
//! # Core Concepts
//!
//! - [`VersionControl`]: the operations the gate needs, implemented by [`Git`]
//! - [`DiffStatsCollector`]: blast-radius numbers for the policy engine
//! - [`GreenManager`]: tag a trusted commit and restore it later
//! - [`SoftFailure`]: non-blocking failures (branch ensure, push) as values
//!
//! All calls are synchronous and block on the `git` subprocess.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod archive;
mod diffstats;
mod error;
mod git;
mod green;

pub use diffstats::{parse_numstat, DiffStatsCollector};
pub use error::{ArchiveError, GreenError, SoftFailure, VcsError};
pub use git::{DiffQuery, Git, GitOutput, VersionControl};
pub use green::{
    GreenManager, GreenMetadata, GreenRecord, PolicyRef, RollbackOptions, RollbackReport,
    RollbackStrategy, DEFAULT_ARCHIVE_DIR, DEFAULT_ARTIFACTS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
