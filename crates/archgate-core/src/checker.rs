//! Upstream checker seam
//!
//! Checkers annotate an envelope before routing. File-level checkers write
//! `meta.file_check` / `meta.file_comment` only; the global status and next
//! action belong to the module-level checker.

use crate::error::CheckerError;
use archgate_artifact::{ChangeEnvelope, EnvelopeError, Sentinels};

/// Annotates an envelope ahead of the router
pub trait Checker {
    fn name(&self) -> &str;

    /// Inspect `envelope` and record findings on it
    ///
    /// # Errors
    /// Returns [`CheckerError`] when the checker itself cannot run; a
    /// rejected envelope is an annotation, not an error.
    fn check(&self, envelope: &mut ChangeEnvelope) -> Result<(), CheckerError>;
}

/// Offline file-level check: sentinels present and a target resolvable
///
/// Optionally restricts the target to a set of extensions.
#[derive(Debug, Clone, Default)]
pub struct SentinelChecker {
    sentinels: Sentinels,
    extensions: Vec<String>,
}

impl SentinelChecker {
    #[must_use]
    pub fn new(sentinels: Sentinels) -> Self {
        Self {
            sentinels,
            extensions: Vec::new(),
        }
    }

    /// Only accept targets with one of these extensions (without the dot)
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    fn findings(&self, envelope: &ChangeEnvelope) -> Result<String, Vec<String>> {
        let block = envelope.block_with(&self.sentinels).map_err(|e| match e {
            EnvelopeError::Block(err) => vec![format!("meta sentinels missing: {err}")],
            other => vec![other.to_string()],
        })?;
        let target = envelope
            .resolve_target(&block)
            .map_err(|_| vec!["target file missing".to_string()])?;

        if !self.extensions.is_empty() {
            let ext = std::path::Path::new(&target)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            if !self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
                return Err(vec![format!(
                    "unexpected extension for {target} (expected {})",
                    self.extensions.join(", ")
                )]);
            }
        }
        Ok(format!("meta ok | target {target}"))
    }
}

impl Checker for SentinelChecker {
    fn name(&self) -> &str {
        "sentinel"
    }

    fn check(&self, envelope: &mut ChangeEnvelope) -> Result<(), CheckerError> {
        match self.findings(envelope) {
            Ok(note) => {
                envelope.meta.file_check = Some("ok".into());
                envelope.meta.file_comment = Some(note);
            }
            Err(reasons) => {
                let joined = reasons.join("; ");
                tracing::debug!(envelope = %envelope.id(), reasons = %joined, "file check rejected");
                envelope.meta.file_check = Some("rejected".into());
                envelope.meta.file_comment = Some(joined.clone());
                envelope.set_error_trace(joined);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archgate_test_utils::{envelope, hello_payload};
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_framed_payload() {
        let mut env = envelope("app/hello.py", &hello_payload("def hello(): pass"));
        SentinelChecker::default()
            .with_extensions(["py"])
            .check(&mut env)
            .unwrap();
        assert_eq!(env.meta.file_check(), "ok");
        assert_eq!(env.meta.file_comment(), "meta ok | target app/hello.py");
        assert_eq!(env.global_status(), None);
        assert_eq!(env.next_action(), None);
    }

    #[test]
    fn rejects_unframed_payload() {
        let mut env = envelope("app/hello.py", "def hello(): pass\n");
        SentinelChecker::default().check(&mut env).unwrap();
        assert_eq!(env.meta.file_check(), "rejected");
        assert!(env.meta.file_comment().starts_with("meta sentinels missing"));
        assert!(env.error_trace().is_some());
        assert_eq!(env.global_status(), None);
    }

    #[test]
    fn rejects_wrong_extension() {
        let mut env = envelope("app/hello.txt", &hello_payload("x"));
        SentinelChecker::default()
            .with_extensions(["py"])
            .check(&mut env)
            .unwrap();
        assert_eq!(env.meta.file_check(), "rejected");
        assert!(env.meta.file_comment().contains("app/hello.txt"));
    }
}
