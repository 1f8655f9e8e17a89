//! Change envelopes
//!
//! A [`ChangeEnvelope`] is one proposed change: a payload framed by sentinel
//! lines plus the annotations upstream checkers left on it. Status fields are
//! write-once and the history is append-only.

use crate::block::{BlockError, EnvelopeBlock, Sentinels};
use crate::status::{lenient, ErrorCategory, GlobalStatus, NextAction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Envelope identifier, `PATCH-<8 hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(String);

impl EnvelopeId {
    /// Generate a fresh identifier
    #[must_use]
    pub fn generate() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("PATCH-{}", &raw[..8]))
    }

    /// Wrap an existing identifier
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional upstream fields carried by an envelope
///
/// Every field may be absent; accessors fall back to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeMeta {
    pub target: Option<String>,
    pub module: Option<String>,
    pub role: Option<String>,
    pub plan_line_id: Option<String>,
    pub file_check: Option<String>,
    pub module_check: Option<String>,
    pub file_comment: Option<String>,
    pub module_comment: Option<String>,
    pub timestamp: Option<String>,
    pub commit_id: Option<String>,
}

fn or_empty(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}

impl EnvelopeMeta {
    #[must_use]
    pub fn module(&self) -> &str {
        or_empty(&self.module)
    }

    #[must_use]
    pub fn role(&self) -> &str {
        or_empty(&self.role)
    }

    #[must_use]
    pub fn plan_line_id(&self) -> &str {
        or_empty(&self.plan_line_id)
    }

    /// File-level checker status (`ok`, `ko`, ...)
    #[must_use]
    pub fn file_check(&self) -> &str {
        or_empty(&self.file_check)
    }

    /// Module-level checker status
    #[must_use]
    pub fn module_check(&self) -> &str {
        or_empty(&self.module_check)
    }

    #[must_use]
    pub fn file_comment(&self) -> &str {
        or_empty(&self.file_comment)
    }

    #[must_use]
    pub fn module_comment(&self) -> &str {
        or_empty(&self.module_comment)
    }

    #[must_use]
    pub fn commit_id(&self) -> Option<&str> {
        self.commit_id.as_deref()
    }
}

/// Errors raised by envelope handling
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Payload framing is malformed
    #[error(transparent)]
    Block(#[from] BlockError),

    /// Neither `meta.target` nor inline `file` names a target
    #[error("envelope {0} has no target file")]
    MissingTarget(EnvelopeId),

    /// Status pair was already recorded
    #[error("status already recorded on {id}: global_status={global_status:?} next_action={next_action:?}")]
    StatusAlreadySet {
        id: EnvelopeId,
        global_status: Option<GlobalStatus>,
        next_action: Option<NextAction>,
    },

    #[error("failed to read envelope {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode envelope: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to decode envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// A unit of proposed change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    #[serde(default)]
    id: EnvelopeId,
    pub payload: String,
    #[serde(default)]
    pub meta: EnvelopeMeta,
    #[serde(
        default,
        deserialize_with = "lenient::global_status",
        skip_serializing_if = "Option::is_none"
    )]
    global_status: Option<GlobalStatus>,
    #[serde(
        default,
        deserialize_with = "lenient::next_action",
        skip_serializing_if = "Option::is_none"
    )]
    next_action: Option<NextAction>,
    #[serde(
        default,
        deserialize_with = "lenient::error_category",
        skip_serializing_if = "Option::is_none"
    )]
    error_category: Option<ErrorCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_trace: Option<String>,
    #[serde(default)]
    history: Vec<String>,
}

impl ChangeEnvelope {
    /// Create an envelope with a generated id and no annotations
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: EnvelopeId::generate(),
            payload: payload.into(),
            meta: EnvelopeMeta {
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
                ..EnvelopeMeta::default()
            },
            global_status: None,
            next_action: None,
            error_category: None,
            error_trace: None,
            history: Vec::new(),
        }
    }

    /// Set the target file
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.meta.target = Some(target.into());
        self
    }

    /// Replace the metadata record
    #[must_use]
    pub fn with_meta(mut self, meta: EnvelopeMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Attach an upstream error classification and optional trace
    #[must_use]
    pub fn with_error(mut self, category: ErrorCategory, trace: Option<String>) -> Self {
        self.error_category = Some(category);
        self.error_trace = trace;
        self
    }

    /// Decode an envelope from YAML (or JSON)
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Yaml`] on malformed input
    pub fn from_yaml_str(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load an envelope file; `.json` files go through `serde_json`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded
    pub fn load(path: &Path) -> Result<Self, EnvelopeError> {
        let text = std::fs::read_to_string(path).map_err(|source| EnvelopeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&text)?)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Serialize to YAML
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Yaml`] if serialization fails
    pub fn to_yaml(&self) -> Result<String, EnvelopeError> {
        Ok(serde_yaml::to_string(self)?)
    }

    #[must_use]
    pub fn id(&self) -> &EnvelopeId {
        &self.id
    }

    #[must_use]
    pub fn global_status(&self) -> Option<GlobalStatus> {
        self.global_status
    }

    #[must_use]
    pub fn next_action(&self) -> Option<NextAction> {
        self.next_action
    }

    #[must_use]
    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.error_category
    }

    #[must_use]
    pub fn error_trace(&self) -> Option<&str> {
        self.error_trace.as_deref()
    }

    /// Replace the error trace without touching the category
    pub fn set_error_trace(&mut self, trace: impl Into<String>) {
        self.error_trace = Some(trace.into());
    }

    /// Record the module checker's verdict
    ///
    /// # Errors
    /// Returns [`EnvelopeError::StatusAlreadySet`] if either field is already set
    pub fn record_status(
        &mut self,
        global_status: GlobalStatus,
        next_action: NextAction,
    ) -> Result<(), EnvelopeError> {
        if self.global_status.is_some() || self.next_action.is_some() {
            return Err(EnvelopeError::StatusAlreadySet {
                id: self.id.clone(),
                global_status: self.global_status,
                next_action: self.next_action,
            });
        }
        self.global_status = Some(global_status);
        self.next_action = Some(next_action);
        Ok(())
    }

    /// Events recorded so far, oldest first
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Append an event to the history
    pub fn append_history(&mut self, event: impl Into<String>) {
        self.history.push(event.into());
    }

    /// Parse the payload block with the default sentinels
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Block`] if the payload is malformed
    pub fn block(&self) -> Result<EnvelopeBlock, EnvelopeError> {
        Ok(EnvelopeBlock::parse(&self.payload)?)
    }

    /// Parse the payload block with custom sentinels
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Block`] if the payload is malformed
    pub fn block_with(&self, sentinels: &Sentinels) -> Result<EnvelopeBlock, EnvelopeError> {
        Ok(EnvelopeBlock::parse_with(&self.payload, sentinels)?)
    }

    /// Target file: `meta.target`, else the inline `file` key of the block
    ///
    /// # Errors
    /// Returns [`EnvelopeError::MissingTarget`] if neither is present
    pub fn resolve_target(&self, block: &EnvelopeBlock) -> Result<String, EnvelopeError> {
        self.meta
            .target
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| block.meta().get("file").filter(|t| !t.trim().is_empty()))
            .map(str::to_string)
            .ok_or_else(|| EnvelopeError::MissingTarget(self.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAYLOAD: &str = "#{begin_meta: { file: app/hello.py }}\nM1\ndef hello(): pass\nM2\n#{end_meta}";

    #[test]
    fn generated_ids_have_patch_prefix() {
        let id = EnvelopeId::generate();
        assert!(id.as_str().starts_with("PATCH-"));
        assert_eq!(id.as_str().len(), "PATCH-".len() + 8);
        assert_ne!(id, EnvelopeId::generate());
    }

    #[test]
    fn status_is_write_once() {
        let mut env = ChangeEnvelope::new(PAYLOAD);
        env.record_status(GlobalStatus::Ok, NextAction::Accept).unwrap();
        let err = env
            .record_status(GlobalStatus::Rejected, NextAction::Rollback)
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::StatusAlreadySet { .. }));
        assert_eq!(env.global_status(), Some(GlobalStatus::Ok));
        assert_eq!(env.next_action(), Some(NextAction::Accept));
    }

    #[test]
    fn history_appends_in_order() {
        let mut env = ChangeEnvelope::new(PAYLOAD);
        env.append_history("a");
        env.append_history(String::from("b"));
        assert_eq!(env.history(), ["a", "b"]);
    }

    #[test]
    fn meta_accessors_default_to_empty() {
        let env = ChangeEnvelope::new(PAYLOAD);
        assert_eq!(env.meta.module(), "");
        assert_eq!(env.meta.file_check(), "");
        assert_eq!(env.meta.commit_id(), None);
    }

    #[test]
    fn target_falls_back_to_inline_file() {
        let env = ChangeEnvelope::new(PAYLOAD);
        let block = env.block().unwrap();
        assert_eq!(env.resolve_target(&block).unwrap(), "app/hello.py");

        let env = env.with_target("other.py");
        assert_eq!(env.resolve_target(&block).unwrap(), "other.py");
    }

    #[test]
    fn missing_target_is_an_error() {
        let env = ChangeEnvelope::new("#{begin_meta: {}}\nx\n#{end_meta}");
        let block = env.block().unwrap();
        assert!(matches!(
            env.resolve_target(&block),
            Err(EnvelopeError::MissingTarget(_))
        ));
    }

    #[test]
    fn loads_from_yaml() {
        let yaml = r"
id: PATCH-0000abcd
payload: |
  #{begin_meta: {}}
  x
  #{end_meta}
meta:
  target: a.py
  file_check: ok
global_status: partial_ok
next_action: accept
error_category: syntax_error
";
        let env = ChangeEnvelope::from_yaml_str(yaml).unwrap();
        assert_eq!(env.id().as_str(), "PATCH-0000abcd");
        assert_eq!(env.meta.file_check(), "ok");
        assert_eq!(env.global_status(), Some(GlobalStatus::PartialOk));
        assert_eq!(env.error_category(), Some(ErrorCategory::Syntax));
        assert!(env.history().is_empty());
    }

    #[test]
    fn status_fields_ignore_case() {
        let yaml = "payload: x\nglobal_status: OK\nnext_action: Retry\nerror_category: Module-Incoherence\n";
        let env = ChangeEnvelope::from_yaml_str(yaml).unwrap();
        assert_eq!(env.global_status(), Some(GlobalStatus::Ok));
        assert_eq!(env.next_action(), Some(NextAction::Retry));
        assert_eq!(env.error_category(), Some(ErrorCategory::ModuleIncoherence));
    }

    #[test]
    fn unrecognized_status_reads_as_absent() {
        let yaml = "payload: x\nglobal_status: ko\nnext_action: later\nerror_category: timeout\n";
        let env = ChangeEnvelope::from_yaml_str(yaml).unwrap();
        assert_eq!(env.global_status(), None);
        assert_eq!(env.next_action(), None);
        assert_eq!(env.error_category(), Some(ErrorCategory::Unknown));
    }

    #[test]
    fn null_and_blank_statuses_are_absent() {
        let yaml = "payload: x\nglobal_status: ~\nerror_category: ''\n";
        let env = ChangeEnvelope::from_yaml_str(yaml).unwrap();
        assert_eq!(env.global_status(), None);
        assert_eq!(env.error_category(), None);

        let json = r#"{"payload": "x", "global_status": "Partial_OK", "error_category": null}"#;
        let env: ChangeEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.global_status(), Some(GlobalStatus::PartialOk));
        assert_eq!(env.error_category(), None);
    }

    #[test]
    fn yaml_round_trip_keeps_history() {
        let mut env = ChangeEnvelope::new(PAYLOAD).with_target("app/hello.py");
        env.append_history("fs:insert markers");
        let back = ChangeEnvelope::from_yaml_str(&env.to_yaml().unwrap()).unwrap();
        assert_eq!(back, env);
    }
}
