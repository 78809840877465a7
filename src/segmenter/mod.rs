// Line-oriented segmentation of script text into translatable units, plus
// the inverse splice that rebuilds the original byte stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod classify;
pub mod exporter;
pub mod profile;

pub use classify::segment;
pub use exporter::reconstruct;
pub use profile::{DialectProfile, LineClass};

/// Metadata key holding the exact line terminator of a unit
/// (`"\r\n"`, `"\n"`, `"\r"`, or empty for a final unterminated line).
pub const META_TERMINATOR: &str = "terminator";

/// Metadata key holding inline control markup stripped from the end of a
/// unit's payload, restored verbatim on export.
pub const META_TRAILING_TAIL: &str = "trailing_tail";

/// One extracted, independently editable piece of translatable text.
///
/// `id` is derived from file identity and sequence position, never from
/// content, so editing the text never changes the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    /// Line content including its original terminator, minus any trailing
    /// control tags peeled into `meta`.
    pub text: String,
    /// Speaker attribution in effect when the unit was encountered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Open map of reconstruction metadata; see `META_TERMINATOR` and
    /// `META_TRAILING_TAIL`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

/// A `[start, end)` byte range in the decoded source text covered by
/// exactly one text unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub id: String,
    pub start: usize,
    pub end: usize,
}

/// Everything a parse pass produces. This is the artifact that crosses the
/// boundary to an editing collaborator; the original bytes are NOT retained
/// and must be supplied again at export time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub engine_id: String,
    pub source_path: String,
    /// Encoding label resolved at parse time, reused verbatim for export.
    pub encoding: String,
    pub units: Vec<TextUnit>,
    pub spans: Vec<TextSpan>,
}

impl ParseResult {
    /// Total character count across unit payloads (reporting only).
    pub fn chars_extracted(&self) -> u64 {
        self.units.iter().map(|u| u.text.chars().count() as u64).sum()
    }
}
