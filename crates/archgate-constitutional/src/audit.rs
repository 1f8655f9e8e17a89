//! Run audit archive
//!
//! A run directory collects everything needed to replay a decision:
//!
//! ```text
//! <run_dir>/
//!   patch_before.yaml        envelope as received
//!   decision.yaml            router decision
//!   patch_after.yaml         envelope after checkers and routing
//!   patch_post_commit.yaml   envelope once a commit id is attached
//!   console.log              human-readable trail of this run
//!   .run.kv                  run info, key=value, sorted
//!   index.yaml               artifacts in the order they were written
//! ```

use crate::error::AuditError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index.yaml";
pub const CONSOLE_FILE: &str = "console.log";
pub const RUN_INFO_FILE: &str = ".run.kv";

/// One line of the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file: String,
    pub at: String,
}

#[derive(Serialize)]
struct Index<'a> {
    items: &'a [IndexEntry],
}

/// Writer for one run directory
#[derive(Debug)]
pub struct RunArchive {
    dir: PathBuf,
    index: Vec<IndexEntry>,
}

impl RunArchive {
    /// Open (creating if needed) a run directory for a new run
    ///
    /// The previous run's console trail is dropped along with its index.
    ///
    /// # Errors
    /// Returns [`AuditError::Io`] if the directory cannot be created or the
    /// old console log cannot be removed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| AuditError::io_error(&dir, e))?;
        let console = dir.join(CONSOLE_FILE);
        match std::fs::remove_file(&console) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AuditError::io_error(&console, e)),
        }
        Ok(Self {
            dir,
            index: Vec::new(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifacts written so far, oldest first
    #[must_use]
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Serialize `value` as YAML into `name`
    ///
    /// # Errors
    /// Returns [`AuditError`] on encoding or IO failure
    pub fn write_yaml<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, AuditError> {
        let text = serde_yaml::to_string(value).map_err(|source| AuditError::Encode {
            name: name.to_string(),
            source,
        })?;
        self.write_text(name, &text)
    }

    /// Write `text` into `name`, replacing any previous content
    ///
    /// # Errors
    /// Returns [`AuditError::Io`] on failure
    pub fn write_text(&mut self, name: &str, text: &str) -> Result<PathBuf, AuditError> {
        let path = self.dir.join(name);
        std::fs::write(&path, text).map_err(|e| AuditError::io_error(&path, e))?;
        self.record(name)?;
        tracing::debug!(file = %path.display(), "run artifact written");
        Ok(path)
    }

    /// Append one line to `console.log`
    ///
    /// # Errors
    /// Returns [`AuditError::Io`] on failure
    pub fn append_console(&mut self, line: &str) -> Result<(), AuditError> {
        let path = self.dir.join(CONSOLE_FILE);
        let created = !path.exists();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::io_error(&path, e))?;
        writeln!(file, "{}", line.trim_end_matches('\n'))
            .map_err(|e| AuditError::io_error(&path, e))?;
        if created {
            self.record(CONSOLE_FILE)?;
        }
        Ok(())
    }

    /// Write `.run.kv` from sorted key/value pairs
    ///
    /// # Errors
    /// Returns [`AuditError::Io`] on failure
    pub fn write_run_info(&mut self, info: &BTreeMap<String, String>) -> Result<PathBuf, AuditError> {
        let text: String = info.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
        self.write_text(RUN_INFO_FILE, &text)
    }

    fn record(&mut self, name: &str) -> Result<(), AuditError> {
        self.index.push(IndexEntry {
            file: name.to_string(),
            at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        });
        let text = serde_yaml::to_string(&Index { items: &self.index }).map_err(|source| {
            AuditError::Encode {
                name: INDEX_FILE.to_string(),
                source,
            }
        })?;
        let path = self.dir.join(INDEX_FILE);
        std::fs::write(&path, text).map_err(|e| AuditError::io_error(&path, e))
    }
}
