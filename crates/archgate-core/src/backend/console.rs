//! Logging-only backend

use super::{target_of, BackendReport, OrchestrationBackend};
use crate::decision::Decision;
use crate::error::BackendError;
use archgate_artifact::ChangeEnvelope;

/// Backend that performs nothing and records what it would have done
///
/// Useful for dry runs; every call is logged and kept in [`lines`](Self::lines).
#[derive(Debug, Default)]
pub struct ConsoleBackend {
    lines: Vec<String>,
}

impl ConsoleBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One line per call, oldest first
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn record(&mut self, operation: &str, envelope: &ChangeEnvelope, decision: &Decision) {
        let meta = &envelope.meta;
        let target = target_of(envelope).unwrap_or_else(|| "∅".into());
        let mut line = format!(
            "[{operation}] {} | file={target} module={} plan_line_id={}",
            decision.summary(),
            fallback(meta.module()),
            fallback(meta.plan_line_id()),
        );
        if !decision.reasons().is_empty() {
            line.push_str(&format!(" | reasons: {}", decision.reasons().join("; ")));
        }
        tracing::info!(envelope = %envelope.id(), operation, "{line}");
        self.lines.push(line);
    }
}

fn fallback(s: &str) -> &str {
    if s.is_empty() {
        "∅"
    } else {
        s
    }
}

impl OrchestrationBackend for ConsoleBackend {
    fn apply_and_commit(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError> {
        self.record("apply", envelope, decision);
        Ok(BackendReport::default())
    }

    fn regenerate(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError> {
        self.record("retry", envelope, decision);
        Ok(BackendReport::default())
    }

    fn rollback_and_log(
        &mut self,
        envelope: &mut ChangeEnvelope,
        decision: &Decision,
    ) -> Result<BackendReport, BackendError> {
        self.record("rollback", envelope, decision);
        Ok(BackendReport::default())
    }
}
