// Terminator-preserving line iteration and the segmentation pass itself.

use std::collections::BTreeMap;

use tracing::debug;

use super::profile::{DialectProfile, LineClass};
use super::{TextSpan, TextUnit, META_TERMINATOR, META_TRAILING_TAIL};

/// Iterator over physical lines that keeps each line's terminator attached.
///
/// WHY: normalizing terminators globally breaks byte-exact round-trips on
/// mixed-terminator files, so every line carries its own `\r\n`, `\n`, `\r`,
/// or nothing for a final unterminated line.
pub struct LinesKeepEnds<'t> {
    rest: &'t str,
}

/// Split text into physical lines, terminators attached.
pub fn lines_keep_ends(text: &str) -> LinesKeepEnds<'_> {
    LinesKeepEnds { rest: text }
}

impl<'t> Iterator for LinesKeepEnds<'t> {
    type Item = &'t str;

    fn next(&mut self) -> Option<&'t str> {
        if self.rest.is_empty() {
            return None;
        }
        let bytes = self.rest.as_bytes();
        let mut end = bytes.len();
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                b'\n' => {
                    end = i + 1;
                    break;
                }
                b'\r' => {
                    end = if bytes.get(i + 1) == Some(&b'\n') { i + 2 } else { i + 1 };
                    break;
                }
                _ => {}
            }
        }
        let (line, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(line)
    }
}

/// Split one physical line into `(content, terminator)`.
/// The terminator is exactly `"\r\n"`, `"\n"`, `"\r"`, or `""`.
pub fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else if let Some(content) = line.strip_suffix('\r') {
        (content, "\r")
    } else {
        (line, "")
    }
}

/// Mutable state scoped to one traversal, discarded at the end.
#[derive(Debug, Default)]
struct ParseState {
    speaker: Option<String>,
    next_index: usize,
}

/// Walk the decoded text line by line and emit one text unit per text line,
/// with a covering span over the decoded text.
///
/// Non-text lines (blank, comment, label, speaker declaration, control-only)
/// pass through untouched and emit nothing; speaker declarations update the
/// running speaker, last one wins. Unit ids are `"<file_path>:<index>"` with
/// a monotonically increasing index, so edits never change ids.
pub fn segment(
    text: &str,
    profile: &DialectProfile,
    file_path: &str,
) -> (Vec<TextUnit>, Vec<TextSpan>) {
    let mut units = Vec::new();
    let mut spans = Vec::new();
    let mut state = ParseState::default();
    let mut offset = 0usize;

    for line in lines_keep_ends(text) {
        let start = offset;
        offset += line.len();
        let (content, terminator) = split_terminator(line);

        match profile.classify(content) {
            LineClass::Blank | LineClass::Comment | LineClass::Label | LineClass::ControlOnly => {}
            LineClass::Speaker(name) => {
                state.speaker = Some(name.to_string());
            }
            LineClass::Text => {
                let (body, tail) = profile.split_trailing_tail(content);

                let id = format!("{file_path}:{}", state.next_index);
                state.next_index += 1;

                let mut meta = BTreeMap::new();
                meta.insert(META_TERMINATOR.to_string(), terminator.to_string());
                if let Some(tail) = tail {
                    meta.insert(META_TRAILING_TAIL.to_string(), tail.to_string());
                }

                units.push(TextUnit {
                    id: id.clone(),
                    text: format!("{body}{terminator}"),
                    speaker: state.speaker.clone(),
                    meta,
                });
                spans.push(TextSpan { id, start, end: offset });
            }
        }
    }

    debug!(
        file_path,
        profile = %profile.id,
        units = units.len(),
        "segmentation pass complete"
    );
    (units, spans)
}
