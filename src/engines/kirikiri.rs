// KiriKiri `.ks` dialect: line-oriented scripts where `;` opens a comment,
// `*` opens a label, bracketed tags carry control flow, and speaker
// declarations are bracketed tags with a name attribute.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::encoding;
use crate::error::ParserError;
use crate::registry::ScriptParser;
use crate::segmenter::profile::{compile_rule, DialectProfile};
use crate::segmenter::{exporter, segment, ParseResult, TextUnit};

/// Base KiriKiri dialect, speaker tag `[cn name="..."]`.
pub fn default_profile() -> Result<DialectProfile, ParserError> {
    let id = "kirikiri.ks";
    Ok(DialectProfile {
        id: id.to_string(),
        extensions: vec!["ks".to_string()],
        comment: compile_rule(id, r"^\s*;")?,
        label: compile_rule(id, r"^\s*\*")?,
        speakers: vec![compile_rule(id, r#"(?i)^\[cn\s+name="([^"]+)"[^\]]*\]$"#)?],
        control_only: compile_rule(id, r"^\s*(?:\[[^\]]+\]\s*)+$")?,
        trailing_tail: Some(compile_rule(id, r"(?:\[[^\]]+\])+$")?),
        fallback_encoding: encoding_rs::SHIFT_JIS,
    })
}

/// Project variant with `[P_NAME ... s_cn="..."]` speaker tags, matched
/// anywhere in the line.
pub fn yandere_profile() -> Result<DialectProfile, ParserError> {
    let id = "kirikiri.ks.yandere";
    Ok(DialectProfile {
        id: id.to_string(),
        extensions: vec!["ks".to_string()],
        comment: compile_rule(id, r"^\s*;")?,
        label: compile_rule(id, r"^\s*\*")?,
        speakers: vec![compile_rule(id, r#"(?i)\[P_NAME\b[^\]]*\bs_cn="([^"]+)""#)?],
        control_only: compile_rule(id, r"^\s*(?:\[[^\]]+\]\s*)+$")?,
        trailing_tail: Some(compile_rule(id, r"(?:\[[^\]]+\])+$")?),
        fallback_encoding: encoding_rs::SHIFT_JIS,
    })
}

/// Factory for the base engine, in the shape `BUILTIN_ENGINES` expects.
pub fn new_default() -> Result<Arc<dyn ScriptParser>, ParserError> {
    Ok(Arc::new(KirikiriKsParser::new(default_profile()?)))
}

/// Factory for the yandere variant.
pub fn new_yandere() -> Result<Arc<dyn ScriptParser>, ParserError> {
    Ok(Arc::new(KirikiriKsParser::new(yandere_profile()?)))
}

/// Profile-driven `.ks` parser focused on stable round-trips.
pub struct KirikiriKsParser {
    profile: DialectProfile,
}

impl KirikiriKsParser {
    pub fn new(profile: DialectProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &DialectProfile {
        &self.profile
    }
}

// Lines opening with a tag, label, or comment marker; used only for content
// sniffing when the extension is missing or unfamiliar.
static SNIFF_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[\[*;]").expect("literal sniff pattern compiles"));

/// Heuristic: treat the input as this dialect when most sampled non-blank
/// lines open with a dialect marker (`[`, `*`, `;`).
fn sniff_markers(data: &[u8]) -> bool {
    let sample_len = data.len().min(2048);
    let sample = String::from_utf8_lossy(&data[..sample_len]);
    let mut total = 0usize;
    let mut marked = 0usize;
    for line in sample.lines().take(32) {
        if line.trim().is_empty() {
            continue;
        }
        total += 1;
        if SNIFF_MARKER.is_match(line) {
            marked += 1;
        }
    }
    total >= 2 && marked * 2 >= total
}

impl ScriptParser for KirikiriKsParser {
    fn engine_id(&self) -> &str {
        &self.profile.id
    }

    fn extensions(&self) -> &[String] {
        &self.profile.extensions
    }

    fn can_handle(&self, file_path: &str, data: &[u8]) -> bool {
        let ext = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        if let Some(ext) = ext {
            if self.profile.extensions.iter().any(|e| *e == ext) {
                return true;
            }
        }
        sniff_markers(data)
    }

    fn parse(&self, data: &[u8], file_path: &str) -> Result<ParseResult, ParserError> {
        let (text, codec) = encoding::resolve(data, self.profile.fallback_encoding);
        let (units, spans) = segment(&text, &self.profile, file_path);
        Ok(ParseResult {
            engine_id: self.profile.id.clone(),
            source_path: file_path.to_string(),
            encoding: codec.name().to_string(),
            units,
            spans,
        })
    }

    fn export(
        &self,
        data: &[u8],
        parsed: &ParseResult,
        edited: &[TextUnit],
    ) -> Result<Vec<u8>, ParserError> {
        exporter::export_bytes(data, parsed, edited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> KirikiriKsParser {
        KirikiriKsParser::new(default_profile().unwrap())
    }

    #[test]
    fn can_handle_by_extension() {
        let p = parser();
        assert!(p.can_handle("scenario/01_01.ks", b""));
        assert!(p.can_handle("SCENARIO/01_01.KS", b""));
        assert!(!p.can_handle("readme.txt", b"plain prose here\nmore prose\n"));
    }

    #[test]
    fn can_handle_by_content_sniff() {
        let p = parser();
        let script = b"*start|\n[wait time=200]\n; comment\nSome text.\n";
        assert!(p.can_handle("mystery.dat", script));
    }

    #[test]
    fn parse_extracts_speaker_and_payload() {
        let p = parser();
        let parsed = p.parse(b"[cn name=\"Alice\"]\nHello there.\n", "a.ks").unwrap();
        assert_eq!(parsed.engine_id, "kirikiri.ks");
        assert_eq!(parsed.encoding, "UTF-8");
        assert_eq!(parsed.units.len(), 1);
        assert_eq!(parsed.units[0].speaker.as_deref(), Some("Alice"));
        assert_eq!(parsed.units[0].text, "Hello there.\n");
    }

    #[test]
    fn export_with_edit_replaces_only_text() {
        let p = parser();
        let data = b"[cn name=\"Alice\"]\nHello there.\n";
        let parsed = p.parse(data, "a.ks").unwrap();

        let mut edited = parsed.units.clone();
        edited[0].text = "Hi!\n".to_string();
        let out = p.export(data, &parsed, &edited).unwrap();
        assert_eq!(out, b"[cn name=\"Alice\"]\nHi!\n");

        // Unedited export reproduces the input exactly.
        let out = p.export(data, &parsed, &parsed.units).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn yandere_speaker_tag_with_other_attributes() {
        let p = KirikiriKsParser::new(yandere_profile().unwrap());
        let parsed = p
            .parse(b"[P_NAME id=7 s_cn=\"Yuki\" face=smile]\nWelcome back.\n", "y.ks")
            .unwrap();
        assert_eq!(parsed.units[0].speaker.as_deref(), Some("Yuki"));
    }

    #[test]
    fn shift_jis_script_records_fallback_tag() {
        let p = parser();
        // "あい。\n" in Shift-JIS.
        let data: &[u8] = &[0x82, 0xA0, 0x82, 0xA2, 0x81, 0x42, 0x0A];
        let parsed = p.parse(data, "s.ks").unwrap();
        assert_eq!(parsed.encoding, "Shift_JIS");
        assert_eq!(p.export(data, &parsed, &parsed.units).unwrap(), data);
    }
}
