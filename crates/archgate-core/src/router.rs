//! Decision routing
//!
//! [`DecisionRouter`] turns the annotations upstream checkers left on an
//! envelope into an [`Action`]. It reads the envelope only and never fails.
//!
//! # Precedence
//!
//! 1. An `error_category`, if present, is mapped through
//!    [`action_for_error`] with the router's mode.
//! 2. Otherwise `(global_status, next_action)`:
//!    `ok + accept` applies, `rejected` or `rollback` rolls back, anything
//!    else (including missing statuses) is retried.

use crate::decision::{Action, Decision};
use crate::error::NormalizeError;
use crate::error_policy::action_for_error;
use archgate_artifact::{ChangeEnvelope, GlobalStatus, NextAction};
use archgate_policy::PolicyMode;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// Longest reason kept, in characters
pub const MAX_REASON_CHARS: usize = 180;

static REASON_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[|;\n•]+").expect("separator pattern is valid"));

const TRIM_CHARS: &[char] = &[' ', '\t', '-', '—', ':', '•'];

const ABSENT: &str = "∅";

/// Optional hook that rewrites checker comments into reasons
///
/// The output still goes through the built-in splitter. An error makes the
/// router fall back to the splitter alone.
pub trait ReasonNormalizer {
    fn normalize(&self, fused: &str) -> Result<Vec<String>, NormalizeError>;
}

impl<F> ReasonNormalizer for F
where
    F: Fn(&str) -> Result<Vec<String>, NormalizeError>,
{
    fn normalize(&self, fused: &str) -> Result<Vec<String>, NormalizeError> {
        self(fused)
    }
}

/// Maps envelope annotations to a [`Decision`]
pub struct DecisionRouter {
    mode: PolicyMode,
    normalizer: Option<Box<dyn ReasonNormalizer>>,
}

impl fmt::Debug for DecisionRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionRouter")
            .field("mode", &self.mode)
            .field("normalizer", &self.normalizer.is_some())
            .finish()
    }
}

impl Default for DecisionRouter {
    fn default() -> Self {
        Self::new(PolicyMode::Enforce)
    }
}

impl DecisionRouter {
    /// Router whose error mapping uses `mode`
    #[must_use]
    pub fn new(mode: PolicyMode) -> Self {
        Self {
            mode,
            normalizer: None,
        }
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Box<dyn ReasonNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    #[must_use]
    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    /// Compute the decision for `envelope`
    #[must_use]
    pub fn route(&self, envelope: &ChangeEnvelope) -> Decision {
        let global_status = envelope.global_status();
        let next_action = envelope.next_action();
        let error_category = envelope.error_category();

        let action = match error_category {
            Some(category) => action_for_error(category, self.mode),
            None => match (global_status, next_action) {
                (Some(GlobalStatus::Ok), Some(NextAction::Accept)) => Action::Apply,
                (_, Some(NextAction::Rollback)) | (Some(GlobalStatus::Rejected), _) => {
                    Action::Rollback
                }
                _ => Action::Retry,
            },
        };

        let gs = global_status.map(GlobalStatus::as_str).unwrap_or_default();
        let na = next_action.map(NextAction::as_str).unwrap_or_default();

        let mut bits = vec![
            format!("global_status={}", or_absent(gs)),
            format!("next_action={}", or_absent(na)),
            format!("decision={action}"),
        ];
        let meta = &envelope.meta;
        if !meta.file_check().is_empty() {
            bits.push(format!("file_checker={}", meta.file_check()));
        }
        if !meta.module_check().is_empty() {
            bits.push(format!("module_checker={}", meta.module_check()));
        }
        if let Some(category) = error_category {
            bits.push(format!("error_category={category}"));
        }

        let decision = Decision::new(
            action,
            gs.to_string(),
            na.to_string(),
            self.collect_reasons(envelope),
            bits.join(" | "),
            non_empty(meta.file_comment()),
            non_empty(meta.module_comment()),
        );
        tracing::debug!(
            envelope = %envelope.id(),
            action = %action,
            reasons = decision.reasons().len(),
            "envelope routed"
        );
        decision
    }

    fn collect_reasons(&self, envelope: &ChangeEnvelope) -> Vec<String> {
        let fused = [
            envelope.meta.file_comment().trim(),
            envelope.meta.module_comment().trim(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
        if fused.is_empty() {
            return Vec::new();
        }

        if let Some(normalizer) = &self.normalizer {
            match normalizer.normalize(&fused) {
                Ok(reasons) => return split_reasons(reasons.iter().map(String::as_str)),
                Err(err) => {
                    tracing::debug!(error = %err, "reason normalizer failed, using splitter");
                }
            }
        }
        split_reasons([fused.as_str()])
    }
}

/// Split comment text into short, trimmed, deduplicated reasons
///
/// Separators are `|`, `;`, newline and `•`. Fragments that are empty after
/// trimming or longer than [`MAX_REASON_CHARS`] are dropped; first
/// occurrence wins.
pub fn split_reasons<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for chunk in chunks {
        for part in REASON_SEPARATORS.split(chunk) {
            let part = part.trim_matches(TRIM_CHARS);
            let len = part.chars().count();
            if len == 0 || len > MAX_REASON_CHARS {
                continue;
            }
            if seen.insert(part.to_string()) {
                out.push(part.to_string());
            }
        }
    }
    out
}

fn or_absent(s: &str) -> &str {
    if s.is_empty() {
        ABSENT
    } else {
        s
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
