// Built-in dialect engines. Registration is explicit and ordered: the host
// calls `register_builtin_engines` (or `builtin_registry`) at startup; there
// are no import-time side effects.

use std::sync::Arc;

use crate::registry::{EngineRegistry, ScriptParser};

pub mod kirikiri;

/// Register every built-in engine into `registry`. A dialect whose profile
/// fails to build is recorded as a failure and skipped; the rest still
/// register.
pub fn register_builtin_engines(registry: &mut EngineRegistry) {
    for (engine_id, factory) in BUILTIN_ENGINES {
        match factory() {
            Ok(parser) => registry.register(engine_id, parser),
            Err(error) => registry.record_failure(engine_id, &error),
        }
    }
}

/// Construct a registry populated with the built-in engines.
pub fn builtin_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    register_builtin_engines(&mut registry);
    registry
}

type EngineFactory = fn() -> Result<Arc<dyn ScriptParser>, crate::error::ParserError>;

/// Built-in (id, factory) pairs in registration order.
const BUILTIN_ENGINES: &[(&str, EngineFactory)] = &[
    ("kirikiri.ks", kirikiri::new_default),
    ("kirikiri.ks.yandere", kirikiri::new_yandere),
];
