// Span-replacement reconstruction: splice edited unit payloads back into the
// original decoded text and re-encode with the encoding recorded at parse
// time.

use std::collections::HashMap;

use tracing::debug;

use crate::encoding;
use crate::error::ParserError;

use super::{ParseResult, TextSpan, TextUnit, META_TERMINATOR, META_TRAILING_TAIL};

/// Splice edited unit payloads into the decoded original text.
///
/// Spans with no matching edited unit are left as original content — partial
/// translations are a supported workflow, not an error. Spans are processed
/// in descending start order so not-yet-processed offsets stay valid.
///
/// Returns [`ParserError::InvalidSpan`] if a span to be replaced does not
/// land on char boundaries inside the text. Units files are plain JSON and
/// source files can change on disk between extraction and injection, so a
/// recorded span is untrusted input here.
pub fn reconstruct(
    original: &str,
    spans: &[TextSpan],
    edited: &[TextUnit],
) -> Result<String, ParserError> {
    let by_id: HashMap<&str, &TextUnit> = edited.iter().map(|u| (u.id.as_str(), u)).collect();

    let mut ordered: Vec<&TextSpan> = spans.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut out = original.to_string();
    let mut replaced = 0usize;
    for span in ordered {
        let Some(unit) = by_id.get(span.id.as_str()) else {
            continue;
        };
        if out.get(span.start..span.end).is_none() {
            return Err(ParserError::InvalidSpan {
                id: span.id.clone(),
                start: span.start,
                end: span.end,
            });
        }
        out.replace_range(span.start..span.end, &restore_line(unit));
        replaced += 1;
    }

    debug!(spans = spans.len(), replaced, "reconstruction pass complete");
    Ok(out)
}

/// Rebuild the full source line for one unit: body, then the stripped
/// trailing tail, then the recorded terminator — in that order. Reversing
/// the last two steps would put the terminator before a control tag and
/// corrupt the script.
fn restore_line(unit: &TextUnit) -> String {
    let terminator = unit.meta.get(META_TERMINATOR).map(String::as_str).unwrap_or("");
    let tail = unit.meta.get(META_TRAILING_TAIL).map(String::as_str).unwrap_or("");

    // A payload is one physical line, so any trailing newline characters on
    // an edited payload are terminator text (possibly of a different style
    // if the editor normalized them) and are replaced by the recorded one.
    let body = unit.text.trim_end_matches(['\r', '\n']);

    let mut line = String::with_capacity(body.len() + tail.len() + terminator.len());
    line.push_str(body);
    if !tail.is_empty() && !body.ends_with(tail) {
        line.push_str(tail);
    }
    line.push_str(terminator);
    line
}

/// Full export path: re-decode the original bytes with the recorded
/// encoding, splice the edited units, and re-encode.
pub fn export_bytes(
    data: &[u8],
    parsed: &ParseResult,
    edited: &[TextUnit],
) -> Result<Vec<u8>, ParserError> {
    let codec = encoding::for_tag(&parsed.encoding)?;
    let text = encoding::decode_with(codec, data);
    let rebuilt = reconstruct(&text, &parsed.spans, edited)?;
    Ok(encoding::encode_with(codec, &rebuilt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::kirikiri;
    use crate::segmenter::segment;

    const SCRIPT: &str = concat!(
        "; scenario 01\r\n",
        "*start|\n",
        "[cn name=\"Alice\"]\n",
        "Hello there.[r]\n",
        "A quiet pause.\r\n",
        "[wait time=200]\n",
        "Final line"
    );

    fn parse(text: &str) -> (Vec<TextUnit>, Vec<TextSpan>) {
        segment(text, &kirikiri::default_profile().unwrap(), "s.ks")
    }

    #[test]
    fn identity_roundtrip_over_mixed_terminators() {
        let (units, spans) = parse(SCRIPT);
        assert_eq!(reconstruct(SCRIPT, &spans, &units).unwrap(), SCRIPT);
    }

    #[test]
    fn identity_roundtrip_each_terminator_style() {
        for term in ["\n", "\r\n", "\r"] {
            let text = format!("[cn name=\"A\"]{term}Hi.{term}Bye.{term}");
            let (units, spans) = parse(&text);
            assert_eq!(reconstruct(&text, &spans, &units).unwrap(), text, "terminator {term:?}");
        }
    }

    #[test]
    fn targeted_edit_changes_only_that_span() {
        let (mut units, spans) = parse(SCRIPT);
        units[1].text = "An awkward pause.\r\n".to_string();
        let out = reconstruct(SCRIPT, &spans, &units).unwrap();

        assert!(out.contains("An awkward pause.\r\n"));
        // Everything outside the edited span is untouched.
        let span = &spans[1];
        assert_eq!(&out[..span.start], &SCRIPT[..span.start]);
        assert_eq!(&out[span.start + "An awkward pause.\r\n".len()..], &SCRIPT[span.end..]);
    }

    #[test]
    fn trailing_tail_restored_after_edit() {
        let text = "Hello.[r]\n";
        let (mut units, spans) = parse(text);
        assert_eq!(units[0].text, "Hello.\n");
        units[0].text = "Hi.\n".to_string();
        assert_eq!(reconstruct(text, &spans, &units).unwrap(), "Hi.[r]\n");
    }

    #[test]
    fn tail_not_duplicated_when_editor_kept_it() {
        let text = "Hello.[r]\n";
        let (mut units, spans) = parse(text);
        units[0].text = "Hi.[r]\n".to_string();
        assert_eq!(reconstruct(text, &spans, &units).unwrap(), "Hi.[r]\n");
    }

    #[test]
    fn missing_terminator_in_edit_is_restored() {
        let text = "Hello.\r\n";
        let (mut units, spans) = parse(text);
        units[0].text = "Hi.".to_string();
        assert_eq!(reconstruct(text, &spans, &units).unwrap(), "Hi.\r\n");
    }

    #[test]
    fn normalized_terminator_in_edit_is_replaced_by_recorded_one() {
        let text = "Hello.\r\n";
        let (mut units, spans) = parse(text);
        units[0].text = "Hi.\n".to_string();
        assert_eq!(reconstruct(text, &spans, &units).unwrap(), "Hi.\r\n");
    }

    #[test]
    fn partial_edit_leaves_missing_ids_untouched() {
        let (mut units, spans) = parse(SCRIPT);
        units[0].text = "Edited first.\n".to_string();
        units.remove(1); // drop "A quiet pause."
        let out = reconstruct(SCRIPT, &spans, &units).unwrap();

        assert!(out.contains("Edited first.[r]\n"));
        assert!(out.contains("A quiet pause.\r\n"));
    }

    #[test]
    fn unknown_extra_units_are_ignored() {
        let (mut units, spans) = parse(SCRIPT);
        units.push(TextUnit {
            id: "other.ks:99".to_string(),
            text: "Stray.\n".to_string(),
            speaker: None,
            meta: Default::default(),
        });
        assert_eq!(reconstruct(SCRIPT, &spans, &units).unwrap(), SCRIPT);
    }

    #[test]
    fn repeated_reconstruction_is_idempotent() {
        let (units, spans) = parse(SCRIPT);
        let once = reconstruct(SCRIPT, &spans, &units).unwrap();
        let twice = reconstruct(&once, &spans, &units).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn stale_span_past_end_of_text_is_an_error() {
        // The source shrank on disk after extraction; the recorded span no
        // longer fits.
        let (units, mut spans) = parse("Hello there, a much longer line.\n");
        spans[0].end = 50;
        let err = reconstruct("short\n", &spans, &units);
        assert!(matches!(
            err,
            Err(ParserError::InvalidSpan { start: 0, end: 50, .. })
        ));
    }

    #[test]
    fn span_off_char_boundary_is_an_error() {
        let text = "あい。\n";
        let (units, mut spans) = parse(text);
        spans[0].end = 1; // mid-character in multi-byte text
        assert!(matches!(
            reconstruct(text, &spans, &units),
            Err(ParserError::InvalidSpan { .. })
        ));
    }

    #[test]
    fn export_bytes_rejects_tampered_span() {
        let data = b"Hello.\n";
        let profile = kirikiri::default_profile().unwrap();
        let (text, codec) = crate::encoding::resolve(data, profile.fallback_encoding);
        let (units, mut spans) = segment(&text, &profile, "s.ks");
        spans[0].end = 200;
        let parsed = ParseResult {
            engine_id: "kirikiri.ks".into(),
            source_path: "s.ks".into(),
            encoding: codec.name().into(),
            units: units.clone(),
            spans,
        };
        assert!(export_bytes(data, &parsed, &units).is_err());
    }

    #[test]
    fn export_bytes_roundtrips_legacy_encoding() {
        // "あい。\n" in Shift-JIS, undecodable as UTF-8.
        let data: &[u8] = &[0x82, 0xA0, 0x82, 0xA2, 0x81, 0x42, 0x0A];
        let parser_profile = kirikiri::default_profile().unwrap();
        let (text, codec) = crate::encoding::resolve(data, parser_profile.fallback_encoding);
        let (units, spans) = segment(&text, &parser_profile, "s.ks");
        let parsed = ParseResult {
            engine_id: "kirikiri.ks".into(),
            source_path: "s.ks".into(),
            encoding: codec.name().into(),
            units: units.clone(),
            spans,
        };
        assert_eq!(export_bytes(data, &parsed, &units).unwrap(), data);
    }
}
