use thiserror::Error;

/// Error taxonomy for parsing, export and registry lookups.
/// WHY: every failure carries enough context (file path, engine id) to
/// diagnose without a debugger; nothing here is retried.
#[derive(Debug, Error)]
pub enum ParserError {
    /// The input does not match any recognized dialect marker.
    #[error("unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    /// Registry lookup with an identifier nobody registered.
    #[error("unknown engine id: {0}")]
    UnknownEngine(String),

    /// An encoding tag recorded at parse time no longer resolves to a codec.
    #[error("unknown encoding tag: {0}")]
    UnknownEncoding(String),

    /// A dialect profile pattern failed to compile.
    #[error("invalid dialect profile {id}: {source}")]
    InvalidProfile {
        id: String,
        #[source]
        source: regex::Error,
    },

    /// A recorded span no longer fits the source text it was captured from
    /// (tampered units file, or the source changed on disk after extraction).
    #[error("span [{start}, {end}) for unit {id} is out of range for the source text")]
    InvalidSpan { id: String, start: usize, end: usize },

    /// Strict-mode verification found output bytes differing from input
    /// with no edits applied.
    #[error("round-trip mismatch for {path} (engine {engine_id})")]
    RoundTrip { path: String, engine_id: String },
}
