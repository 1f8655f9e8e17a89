//! Diff statistics record
//!
//! [`DiffStats`] summarizes a diff as reported by version control. It is
//! built once per evaluation and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// Per-file line counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub path: String,
    pub added: u64,
    pub deleted: u64,
}

/// Aggregate statistics of a diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub files_changed: u64,
    pub loc_added: u64,
    pub loc_deleted: u64,
    pub patch_size_bytes: u64,
    pub by_file: Vec<FileStat>,
    pub has_binary: bool,
    pub paths: Vec<String>,
}

impl DiffStats {
    /// Build totals from per-file entries
    ///
    /// Binary files appear in `by_file` with zero line counts; `has_binary`
    /// records whether any were seen.
    #[must_use]
    pub fn from_files(by_file: Vec<FileStat>, has_binary: bool, patch_size_bytes: u64) -> Self {
        let loc_added = by_file.iter().map(|f| f.added).sum();
        let loc_deleted = by_file.iter().map(|f| f.deleted).sum();
        let paths: Vec<String> = by_file.iter().map(|f| f.path.clone()).collect();

        Self {
            files_changed: paths.len() as u64,
            loc_added,
            loc_deleted,
            patch_size_bytes,
            by_file,
            has_binary,
            paths,
        }
    }

    /// Short human summary, used in commit messages
    #[must_use]
    pub fn blast_radius(&self) -> String {
        format!(
            "files={} +{} -{} bytes={}",
            self.files_changed, self.loc_added, self.loc_deleted, self.patch_size_bytes
        )
    }
}
