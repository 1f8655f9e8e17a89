//! Testing utilities for ArchGate workspace
//!
//! Shared fixtures: scratch git repositories and envelope builders.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use archgate_artifact::{ChangeEnvelope, EnvelopeMeta, GlobalStatus, NextAction};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub const HELLO_BEGIN: &str = "# <ARCH:BEGIN hello>";
pub const HELLO_END: &str = "# <ARCH:END hello>";

/// Sentinel-framed payload with markers around `body`
pub fn marked_payload(file: &str, begin: &str, body: &str, end: &str) -> String {
    format!("#{{begin_meta: {{ file: {file} }}}}\n{begin}\n{body}\n{end}\n#{{end_meta}}\n")
}

/// Sentinel-framed payload without markers (full-file mode)
pub fn fullfile_payload(file: &str, body: &str) -> String {
    format!("#{{begin_meta: {{ file: {file}, fs_intent: fullfile }}}}\n{body}\n#{{end_meta}}\n")
}

/// The `hello` scenario payload for `app/hello.py`
pub fn hello_payload(body: &str) -> String {
    marked_payload("app/hello.py", HELLO_BEGIN, body, HELLO_END)
}

/// Envelope targeting `target`, no annotations
pub fn envelope(target: &str, payload: &str) -> ChangeEnvelope {
    ChangeEnvelope::new(payload).with_target(target)
}

/// Envelope both checkers accepted
pub fn accepted_envelope(target: &str, payload: &str) -> ChangeEnvelope {
    annotated_envelope(target, payload, GlobalStatus::Ok, NextAction::Accept)
}

/// Envelope with a recorded module verdict and `file_check: ok`
pub fn annotated_envelope(
    target: &str,
    payload: &str,
    global_status: GlobalStatus,
    next_action: NextAction,
) -> ChangeEnvelope {
    let mut env = ChangeEnvelope::new(payload).with_meta(EnvelopeMeta {
        target: Some(target.to_string()),
        module: Some("app".into()),
        role: Some("Implementer".into()),
        plan_line_id: Some("PL-0001".into()),
        file_check: Some("ok".into()),
        module_check: Some(global_status.as_str().into()),
        ..EnvelopeMeta::default()
    });
    env.record_status(global_status, next_action)
        .expect("fresh envelope has no status");
    env
}

/// A scratch git repository on branch `main` with one initial commit
pub struct TempRepo {
    dir: TempDir,
}

impl TempRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let repo = Self { dir };
        repo.git(&["init", "-q"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.name", "ArchGate Test"]);
        repo.git(&["config", "user.email", "test@archgate.invalid"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.git(&["config", "tag.gpgsign", "false"]);
        repo.write("README.md", "scratch\n");
        repo.commit_all("initial");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(path, content).expect("write file");
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.join(rel)).expect("read file")
    }

    /// Stage everything and commit; returns the new HEAD id
    pub fn commit_all(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
        self.head()
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    /// Run git, panicking on failure; returns trimmed stdout
    pub fn git(&self, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("spawn git");
        assert!(
            out.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }
}

impl Default for TempRepo {
    fn default() -> Self {
        Self::new()
    }
}
