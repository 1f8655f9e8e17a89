//! Envelope block framing
//!
//! An envelope payload is a block of text framed by two sentinel lines:
//!
//! ```text
//! #{begin_meta: { file: app/hello.py, module: app, fs_intent: markers }}
//! # <ARCH:BEGIN hello>          <- marker begin (optional)
//! def hello(): pass             <- payload
//! # <ARCH:END hello>            <- marker end (optional)
//! #{end_meta}
//! ```
//!
//! When the inner content has at least three lines, the first and last inner
//! lines are taken as markers unless the inline metadata says otherwise via
//! the `fs_intent` key (`markers` or `fullfile`).

use std::collections::BTreeMap;

/// Default begin sentinel prefix
pub const BEGIN_SENTINEL: &str = "#{begin_meta:";

/// Default end sentinel line
pub const END_SENTINEL: &str = "#{end_meta}";

/// Sentinel pair used to frame a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    /// Prefix of the opening line
    pub begin: String,
    /// Closing line (compared after trimming)
    pub end: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            begin: BEGIN_SENTINEL.to_string(),
            end: END_SENTINEL.to_string(),
        }
    }
}

/// How the payload is meant to land in the target file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsIntent {
    /// Payload is anchored between two marker lines
    Markers,
    /// Payload replaces the whole file
    FullFile,
}

impl FsIntent {
    fn from_meta(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "markers" => Some(Self::Markers),
            "fullfile" | "full_file" | "full-file" => Some(Self::FullFile),
            _ => None,
        }
    }

    /// Label used in history lines
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Markers => "markers",
            Self::FullFile => "fullfile",
        }
    }
}

/// Marker lines bracketing a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPair {
    /// Opening marker line
    pub begin: String,
    /// Closing marker line
    pub end: String,
}

/// Inline `key: value` metadata carried on the begin sentinel line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineMeta(BTreeMap<String, String>);

impl InlineMeta {
    /// Parse the text following the begin sentinel
    ///
    /// Accepts `{ a: b, c: d }}` as well as JSON-ish `{"a": "b"}}`. Entries
    /// without a colon are ignored.
    #[must_use]
    pub fn parse(rest: &str) -> Self {
        let mut body = rest.trim();
        body = body.strip_suffix('}').unwrap_or(body).trim();
        if let Some(inner) = body.strip_prefix('{') {
            body = inner.strip_suffix('}').unwrap_or(inner);
        }

        let mut entries = BTreeMap::new();
        for item in body.split(',') {
            let Some((key, value)) = item.split_once(':') else {
                continue;
            };
            let key = unquote(key.trim());
            if key.is_empty() {
                continue;
            }
            entries.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Self(entries)
    }

    /// Look up a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether no entries were found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn unquote(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

/// Errors raised while framing a block
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// No line starts with the begin sentinel
    #[error("invalid block: no line starts with '{0}'")]
    MissingBegin(String),

    /// No end sentinel after the begin line
    #[error("invalid block: no '{0}' line after the begin sentinel")]
    MissingEnd(String),

    /// `fs_intent: markers` declared but no marker lines available
    #[error("invalid block: markers declared but only {inner_lines} inner line(s)")]
    MarkersExpected { inner_lines: usize },
}

/// A parsed envelope block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeBlock {
    begin_line: String,
    end_line: String,
    markers: Option<MarkerPair>,
    payload: String,
    meta: InlineMeta,
}

impl EnvelopeBlock {
    /// Parse using the default sentinels
    ///
    /// # Errors
    /// Returns [`BlockError`] if a sentinel is missing
    pub fn parse(text: &str) -> Result<Self, BlockError> {
        Self::parse_with(text, &Sentinels::default())
    }

    /// Parse using custom sentinels
    ///
    /// # Errors
    /// Returns [`BlockError`] if a sentinel is missing or declared markers are absent
    pub fn parse_with(text: &str, sentinels: &Sentinels) -> Result<Self, BlockError> {
        let lines: Vec<&str> = text.lines().collect();

        let i_begin = lines
            .iter()
            .position(|ln| ln.starts_with(&sentinels.begin))
            .ok_or_else(|| BlockError::MissingBegin(sentinels.begin.clone()))?;
        let i_end = lines[i_begin + 1..]
            .iter()
            .position(|ln| ln.trim() == sentinels.end)
            .map(|offset| i_begin + 1 + offset)
            .ok_or_else(|| BlockError::MissingEnd(sentinels.end.clone()))?;

        let begin_line = lines[i_begin];
        let meta = InlineMeta::parse(&begin_line[sentinels.begin.len()..]);
        let inner = &lines[i_begin + 1..i_end];

        let declared = meta.get("fs_intent").and_then(FsIntent::from_meta);
        let use_markers = match declared {
            Some(FsIntent::FullFile) => false,
            Some(FsIntent::Markers) if inner.len() < 3 => {
                return Err(BlockError::MarkersExpected {
                    inner_lines: inner.len(),
                })
            }
            Some(FsIntent::Markers) => true,
            None => inner.len() >= 3,
        };

        let (markers, payload_lines) = if use_markers {
            let pair = MarkerPair {
                begin: inner[0].to_string(),
                end: inner[inner.len() - 1].to_string(),
            };
            (Some(pair), &inner[1..inner.len() - 1])
        } else {
            (None, inner)
        };

        let payload = payload_lines.join("\n").trim_end_matches('\n').to_string();

        Ok(Self {
            begin_line: begin_line.to_string(),
            end_line: lines[i_end].to_string(),
            markers,
            payload,
            meta,
        })
    }

    /// Begin sentinel line, verbatim
    #[must_use]
    pub fn begin_line(&self) -> &str {
        &self.begin_line
    }

    /// End sentinel line, verbatim
    #[must_use]
    pub fn end_line(&self) -> &str {
        &self.end_line
    }

    /// Marker pair, if the block is anchored
    #[must_use]
    pub fn markers(&self) -> Option<&MarkerPair> {
        self.markers.as_ref()
    }

    /// Payload text (without sentinels or markers, no trailing newline)
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Inline metadata from the begin line
    #[must_use]
    pub fn meta(&self) -> &InlineMeta {
        &self.meta
    }

    /// How this block lands in a file
    #[must_use]
    pub fn intent(&self) -> FsIntent {
        if self.markers.is_some() {
            FsIntent::Markers
        } else {
            FsIntent::FullFile
        }
    }

    /// Canonical rendering: sentinels, markers and payload, one per line,
    /// without a trailing newline
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = Vec::with_capacity(5);
        out.push(self.begin_line.as_str());
        if let Some(m) = &self.markers {
            out.push(m.begin.as_str());
            out.push(self.payload.as_str());
            out.push(m.end.as_str());
        } else if !self.payload.is_empty() {
            out.push(self.payload.as_str());
        }
        out.push(self.end_line.as_str());
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marked(payload: &str) -> String {
        format!("#{{begin_meta: {{ file: app/hello.py }}}}\nM1\n{payload}\nM2\n#{{end_meta}}")
    }

    #[test]
    fn parses_markers_and_payload() {
        let block = EnvelopeBlock::parse(&marked("def hello(): pass")).unwrap();
        let markers = block.markers().unwrap();
        assert_eq!(markers.begin, "M1");
        assert_eq!(markers.end, "M2");
        assert_eq!(block.payload(), "def hello(): pass");
        assert_eq!(block.intent(), FsIntent::Markers);
        assert_eq!(block.meta().get("file"), Some("app/hello.py"));
    }

    #[test]
    fn short_inner_content_is_full_file() {
        let text = "#{begin_meta: {}}\nline one\nline two\n#{end_meta}\n";
        let block = EnvelopeBlock::parse(text).unwrap();
        assert!(block.markers().is_none());
        assert_eq!(block.payload(), "line one\nline two");
        assert_eq!(block.intent(), FsIntent::FullFile);
    }

    #[test]
    fn declared_fullfile_overrides_heuristic() {
        let text = "#{begin_meta: { fs_intent: fullfile }}\na\nb\nc\n#{end_meta}";
        let block = EnvelopeBlock::parse(text).unwrap();
        assert!(block.markers().is_none());
        assert_eq!(block.payload(), "a\nb\nc");
    }

    #[test]
    fn declared_markers_require_three_lines() {
        let text = "#{begin_meta: { fs_intent: markers }}\na\nb\n#{end_meta}";
        assert_eq!(
            EnvelopeBlock::parse(text),
            Err(BlockError::MarkersExpected { inner_lines: 2 })
        );
    }

    #[test]
    fn missing_sentinels_are_errors() {
        assert!(matches!(
            EnvelopeBlock::parse("def f(): pass\n#{end_meta}"),
            Err(BlockError::MissingBegin(_))
        ));
        assert!(matches!(
            EnvelopeBlock::parse("#{begin_meta: {}}\ndef f(): pass"),
            Err(BlockError::MissingEnd(_))
        ));
    }

    #[test]
    fn end_sentinel_must_follow_begin() {
        let text = "#{end_meta}\n#{begin_meta: {}}\nx";
        assert!(matches!(
            EnvelopeBlock::parse(text),
            Err(BlockError::MissingEnd(_))
        ));
    }

    #[test]
    fn render_is_canonical() {
        let text = marked("def hello(): pass\n\n");
        let block = EnvelopeBlock::parse(&text).unwrap();
        assert_eq!(
            block.render(),
            "#{begin_meta: { file: app/hello.py }}\nM1\ndef hello(): pass\nM2\n#{end_meta}"
        );
    }

    #[test]
    fn inline_meta_handles_quotes_and_colons_in_values() {
        let meta = InlineMeta::parse(
            r#" {"file": "a.py", timestamp: 2025-08-12T12:34:56, flag: true}}"#,
        );
        assert_eq!(meta.get("file"), Some("a.py"));
        assert_eq!(meta.get("timestamp"), Some("2025-08-12T12:34:56"));
        assert_eq!(meta.get("flag"), Some("true"));
        assert_eq!(meta.iter().count(), 3);
    }

    #[test]
    fn custom_sentinels() {
        let sentinels = Sentinels {
            begin: "// BEGIN".into(),
            end: "// END".into(),
        };
        let block = EnvelopeBlock::parse_with("// BEGIN x\nfn a() {}\n// END", &sentinels).unwrap();
        assert_eq!(block.payload(), "fn a() {}");
        assert!(block.meta().is_empty());
    }
}
