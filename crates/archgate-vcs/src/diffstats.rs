//! Diff statistics from version control

use crate::error::VcsError;
use crate::git::{DiffQuery, VersionControl};
use archgate_artifact::{DiffStats, FileStat};

/// Parse `git diff --numstat` output
///
/// Returns per-file stats and whether a binary entry (`-\t-\tpath`) was seen.
/// Lines that do not have three tab-separated fields are ignored.
#[must_use]
pub fn parse_numstat(output: &str) -> (Vec<FileStat>, bool) {
    let mut files = Vec::new();
    let mut has_binary = false;

    for line in output.lines() {
        let mut parts = line.splitn(3, '\t');
        let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let counts = added.parse::<u64>().ok().zip(deleted.parse::<u64>().ok());
        let (added, deleted) = counts.unwrap_or_else(|| {
            has_binary = true;
            (0, 0)
        });
        files.push(FileStat {
            path: path.to_string(),
            added,
            deleted,
        });
    }
    (files, has_binary)
}

/// Builds [`DiffStats`] from a version-control backend
pub struct DiffStatsCollector<'a, V: VersionControl + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VersionControl + ?Sized> DiffStatsCollector<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    /// Compute stats for a diff
    ///
    /// # Errors
    /// Returns [`VcsError`] if either diff command fails
    pub fn collect(&self, query: &DiffQuery) -> Result<DiffStats, VcsError> {
        let numstat = self.vcs.diff_numstat(query)?;
        let (by_file, has_binary) = parse_numstat(&numstat);
        let patch = self.vcs.diff_patch(query)?;
        let stats = DiffStats::from_files(by_file, has_binary, patch.len() as u64);
        tracing::debug!(
            files = stats.files_changed,
            added = stats.loc_added,
            deleted = stats.loc_deleted,
            bytes = stats.patch_size_bytes,
            "diff stats collected"
        );
        Ok(stats)
    }

    /// Worktree against HEAD, restricted to `paths`
    ///
    /// # Errors
    /// Returns [`VcsError`] if either diff command fails
    pub fn for_paths(&self, paths: &[String]) -> Result<DiffStats, VcsError> {
        self.collect(&DiffQuery::worktree_paths(paths.to_vec()))
    }
}
