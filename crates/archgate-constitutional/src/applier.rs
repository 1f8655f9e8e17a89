//! Idempotent patch application
//!
//! [`PatchApplier`] writes an envelope's payload into its target file so that
//! re-applying the same envelope is a no-op.
//!
//! # Modes
//!
//! - **Markers**: the payload lives between two marker lines. If both markers
//!   are in the file, the text between them is compared (short SHA-256) with
//!   the payload and replaced only when it differs; everything outside the
//!   window is left byte-for-byte. If they are absent, the canonical block is
//!   appended to the file.
//! - **Full file**: the whole file is compared with the envelope text and
//!   overwritten when it differs.
//!
//! Writes go through a temporary file in the target directory and are
//! persisted by rename.

use crate::error::ApplyError;
use archgate_artifact::{short_digest, ChangeEnvelope, EnvelopeBlock, FsIntent, MarkerPair};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// What happened to the target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyAction {
    /// Block appended (markers were absent)
    Insert,
    /// Marker window or whole file rewritten
    Replace,
    /// Content already matched; nothing written
    Skip,
}

impl ApplyAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Replace => "replace",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub action: ApplyAction,
    pub intent: FsIntent,
    /// Appended bytes for an insert, file size for a replace, 0 for a skip
    pub bytes_written: u64,
    pub payload_hash: String,
    /// Target path relative to the applier root, as given by the envelope
    pub target: String,
    pub path: PathBuf,
}

/// Applies envelopes to files under a root directory
#[derive(Debug, Clone)]
pub struct PatchApplier {
    root: PathBuf,
    create_parents: bool,
}

impl PatchApplier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_parents: false,
        }
    }

    /// Create missing parent directories instead of failing
    #[must_use]
    pub fn with_create_parents(mut self, create: bool) -> Self {
        self.create_parents = create;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply `envelope` to its target and record the outcome in its history
    ///
    /// # Errors
    /// Malformed blocks and a missing target fail before any file is touched;
    /// IO failures and a missing parent directory are also errors.
    pub fn apply(&self, envelope: &mut ChangeEnvelope) -> Result<ApplyOutcome, ApplyError> {
        let block = envelope.block()?;
        let target = envelope.resolve_target(&block)?;
        let path = self.root.join(&target);
        let payload_hash = short_digest(block.payload());
        let current = read_or_empty(&path)?;

        let (action, bytes_written, previous_hash) = match block.markers() {
            Some(markers) => self.apply_markers(&path, &current, &block, markers, &payload_hash)?,
            None => self.apply_full_file(&path, &current, &envelope.payload)?,
        };

        let intent = block.intent();
        let mut event = format!(
            "fs:{action} {} payload_hash={payload_hash} file={target}",
            intent.label()
        );
        if let Some(previous) = previous_hash {
            event.push_str(&format!(" previous_hash={previous}"));
        }
        tracing::info!(
            envelope = %envelope.id(),
            action = %action,
            mode = intent.label(),
            file = %target,
            bytes = bytes_written,
            "envelope applied"
        );
        envelope.append_history(event);

        Ok(ApplyOutcome {
            action,
            intent,
            bytes_written,
            payload_hash,
            target,
            path,
        })
    }

    fn apply_markers(
        &self,
        path: &Path,
        current: &str,
        block: &EnvelopeBlock,
        markers: &MarkerPair,
        payload_hash: &str,
    ) -> Result<(ApplyAction, u64, Option<String>), ApplyError> {
        let lines: Vec<&str> = current.split_inclusive('\n').collect();

        if let Some((i_begin, i_end)) = find_window(&lines, markers) {
            let inner = lines[i_begin + 1..i_end].concat();
            let current_hash = short_digest(strip_eol(&inner));
            if current_hash == payload_hash {
                tracing::debug!(file = %path.display(), "marker window unchanged");
                return Ok((ApplyAction::Skip, 0, None));
            }

            let mut updated = lines[..=i_begin].concat();
            if !block.payload().is_empty() {
                updated.push_str(block.payload());
                updated.push('\n');
            }
            updated.push_str(&lines[i_end..].concat());
            self.write_atomic(path, &updated)?;
            return Ok((ApplyAction::Replace, updated.len() as u64, Some(current_hash)));
        }

        let mut appended = String::new();
        if !current.is_empty() && !current.ends_with('\n') {
            appended.push('\n');
        }
        appended.push_str(&block.render());
        appended.push('\n');

        let mut updated = String::with_capacity(current.len() + appended.len());
        updated.push_str(current);
        updated.push_str(&appended);
        self.write_atomic(path, &updated)?;
        Ok((ApplyAction::Insert, appended.len() as u64, None))
    }

    fn apply_full_file(
        &self,
        path: &Path,
        current: &str,
        text: &str,
    ) -> Result<(ApplyAction, u64, Option<String>), ApplyError> {
        let current_hash = short_digest(current);
        if current_hash == short_digest(text) {
            return Ok((ApplyAction::Skip, 0, None));
        }
        self.write_atomic(path, text)?;
        Ok((ApplyAction::Replace, text.len() as u64, Some(current_hash)))
    }

    fn write_atomic(&self, path: &Path, content: &str) -> Result<(), ApplyError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            if !self.create_parents {
                return Err(ApplyError::MissingParent(path.to_path_buf()));
            }
            std::fs::create_dir_all(parent).map_err(|e| ApplyError::io_error(parent, e))?;
        }

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| ApplyError::io_error(parent, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| ApplyError::io_error(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| ApplyError::io_error(path, e.error))?;
        Ok(())
    }
}

fn read_or_empty(path: &Path) -> Result<String, ApplyError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ApplyError::io_error(path, e)),
    }
}

/// Drop one trailing line terminator
fn strip_eol(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}

/// Line indices of the marker-begin line and the first marker-end line after it
fn find_window(lines: &[&str], markers: &MarkerPair) -> Option<(usize, usize)> {
    let begin = markers.begin.trim();
    let end = markers.end.trim();
    let i_begin = lines.iter().position(|l| strip_eol(l).trim() == begin)?;
    let offset = lines[i_begin + 1..]
        .iter()
        .position(|l| strip_eol(l).trim() == end)?;
    Some((i_begin, i_begin + 1 + offset))
}
