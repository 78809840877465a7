pub mod discovery;
pub mod encoding;
pub mod engines;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod segmenter;
pub mod sidecar;

// Re-export main types for convenient access
pub use error::ParserError;
pub use registry::{verify_round_trip, EngineRegistry, ScriptParser};
pub use segmenter::{
    DialectProfile, ParseResult, TextSpan, TextUnit, META_TERMINATOR, META_TRAILING_TAIL,
};

// Re-export pipeline types for the CLI and external callers
pub use pipeline::{ExtractOptions, FileStats, InjectOptions, RunStats};
