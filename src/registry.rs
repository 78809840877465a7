// Engine registry: explicit name -> parser lookup with no import-time side
// effects and no process-wide singleton. The application constructs one
// registry at startup, populates it, and passes it by reference.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ParserError;
use crate::segmenter::{ParseResult, TextUnit};

/// One dialect's parser. Implementations are immutable and shareable across
/// concurrent invocations; all per-document state lives inside `parse`.
pub trait ScriptParser: Send + Sync {
    /// Stable engine identifier, e.g. `kirikiri.ks`.
    fn engine_id(&self) -> &str;

    /// File extensions (lowercase, without dot) this engine claims.
    fn extensions(&self) -> &[String];

    /// Cheap detection: extension check, optionally content sniffing.
    fn can_handle(&self, file_path: &str, data: &[u8]) -> bool;

    /// Extract translatable units with recoverable spans.
    fn parse(&self, data: &[u8], file_path: &str) -> Result<ParseResult, ParserError>;

    /// Rebuild output bytes from the original bytes plus (possibly edited)
    /// units. `parsed` must come from a `parse` of the same bytes.
    fn export(
        &self,
        data: &[u8],
        parsed: &ParseResult,
        edited: &[TextUnit],
    ) -> Result<Vec<u8>, ParserError>;
}

/// Name -> parser store with explicit lifecycle: construct, populate, query.
///
/// A dialect whose rules fail to build is recorded as a failure instead of
/// aborting the process; the registry stays usable with whatever engines did
/// register, including none at all.
#[derive(Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn ScriptParser>>,
    failures: Vec<(String, String)>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser under a stable engine id.
    pub fn register(&mut self, engine_id: &str, parser: Arc<dyn ScriptParser>) {
        info!(engine_id, "registered engine");
        self.engines.insert(engine_id.to_string(), parser);
    }

    /// Record a dialect that failed to register, without aborting.
    pub fn record_failure(&mut self, engine_id: &str, error: &ParserError) {
        warn!(engine_id, %error, "engine registration failed");
        self.failures.push((engine_id.to_string(), error.to_string()));
    }

    /// Look up an engine by id.
    pub fn get(&self, engine_id: &str) -> Result<Arc<dyn ScriptParser>, ParserError> {
        self.engines
            .get(engine_id)
            .cloned()
            .ok_or_else(|| ParserError::UnknownEngine(engine_id.to_string()))
    }

    /// Sorted list of registered engine ids.
    pub fn list(&self) -> Vec<String> {
        // BTreeMap keys are already sorted.
        self.engines.keys().cloned().collect()
    }

    /// Registration failures recorded during population.
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    /// Union of all extensions claimed by registered engines, sorted and
    /// deduplicated. Drives file discovery.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self
            .engines
            .values()
            .flat_map(|p| p.extensions().iter().cloned())
            .collect();
        exts.sort();
        exts.dedup();
        exts
    }

    /// Find the first registered engine (in id order) that claims this file.
    pub fn parser_for_path(
        &self,
        file_path: &str,
        data: &[u8],
    ) -> Option<(String, Arc<dyn ScriptParser>)> {
        self.engines
            .iter()
            .find(|(_, parser)| parser.can_handle(file_path, data))
            .map(|(id, parser)| (id.clone(), Arc::clone(parser)))
    }
}

/// Checkable round-trip property: parsing then exporting with the unedited
/// unit set must reproduce the input byte-for-byte. Used by strict mode.
pub fn verify_round_trip(
    parser: &dyn ScriptParser,
    data: &[u8],
    file_path: &str,
) -> Result<ParseResult, ParserError> {
    let parsed = parser.parse(data, file_path)?;
    let rebuilt = parser.export(data, &parsed, &parsed.units)?;
    if rebuilt != data {
        return Err(ParserError::RoundTrip {
            path: file_path.to_string(),
            engine_id: parsed.engine_id.clone(),
        });
    }
    Ok(parsed)
}
