use encoding_rs::Encoding;
use regex::Regex;

use crate::error::ParserError;

/// Structural role of one script line.
///
/// The order of the variants mirrors the fixed evaluation order in
/// [`DialectProfile::classify`]; the same order is used by parse and
/// reconstruction passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass<'t> {
    Blank,
    Comment,
    Label,
    /// Speaker declaration; carries the captured speaker name.
    Speaker(&'t str),
    ControlOnly,
    Text,
}

/// Immutable bundle of pattern rules implementing one dialect.
///
/// Rules are pure functions of line content; all traversal state (current
/// speaker, unit counter) lives in the segmentation pass, never here, so one
/// profile can be shared across concurrent parses.
#[derive(Debug, Clone)]
pub struct DialectProfile {
    pub id: String,
    /// File extensions (lowercase, without dot) this dialect claims.
    pub extensions: Vec<String>,
    pub comment: Regex,
    pub label: Regex,
    /// Speaker-declaration patterns tried in declared priority order; the
    /// first match wins. Capture group 1 is the speaker name.
    pub speakers: Vec<Regex>,
    /// A line composed entirely of control tags, with no literal text.
    pub control_only: Regex,
    /// Optional pattern for inline control tags anchored at end of content;
    /// when present, matching suffixes are peeled off text payloads.
    pub trailing_tail: Option<Regex>,
    /// Legacy encoding to fall back to when strict UTF-8 decoding fails.
    pub fallback_encoding: &'static Encoding,
}

impl DialectProfile {
    /// Classify a line (terminator already removed).
    ///
    /// Evaluation order is fixed: blank, comment, label, speaker,
    /// control-only, otherwise text. Divergence between passes breaks the
    /// round-trip, so this is the only classification entry point.
    pub fn classify<'t>(&self, content: &'t str) -> LineClass<'t> {
        if content.trim().is_empty() {
            return LineClass::Blank;
        }
        if self.comment.is_match(content) {
            return LineClass::Comment;
        }
        if self.label.is_match(content) {
            return LineClass::Label;
        }
        for rule in &self.speakers {
            if let Some(captures) = rule.captures(content.trim()) {
                if let Some(name) = captures.get(1) {
                    return LineClass::Speaker(name.as_str());
                }
            }
        }
        if self.control_only.is_match(content) {
            return LineClass::ControlOnly;
        }
        LineClass::Text
    }

    /// Split a text line's content into `(body, trailing_tail)` according to
    /// the profile's trailing-tail rule. The tail, when present, is the
    /// exact suffix string removed.
    pub fn split_trailing_tail<'t>(&self, content: &'t str) -> (&'t str, Option<&'t str>) {
        let Some(rule) = &self.trailing_tail else {
            return (content, None);
        };
        match rule.find(content) {
            // WHY: never strip the entire line — a line of nothing but tags
            // is classified control-only before it gets here, but a profile
            // with mismatched rules must not produce empty payloads.
            Some(m) if m.end() == content.len() && m.start() > 0 => {
                (&content[..m.start()], Some(m.as_str()))
            }
            _ => (content, None),
        }
    }
}

/// Fallible constructor helper; pattern errors become registration failures
/// rather than panics.
pub(crate) fn compile_rule(profile_id: &str, pattern: &str) -> Result<Regex, ParserError> {
    Regex::new(pattern).map_err(|source| ParserError::InvalidProfile {
        id: profile_id.to_string(),
        source,
    })
}
