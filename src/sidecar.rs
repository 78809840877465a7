// Units sidecar management: each parsed script gets a `<file>.units.json`
// document next to it holding the serialized parse result. Translators edit
// unit payloads in place; inject reads the sidecar back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::segmenter::ParseResult;

/// Suffix appended to a source file name to form its sidecar name.
pub const UNITS_SUFFIX: &str = ".units.json";

/// Sidecar path for a source script, e.g. `01_01.ks` -> `01_01.ks.units.json`.
pub fn units_file_path(source_path: &Path) -> PathBuf {
    let mut name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    name.push_str(UNITS_SUFFIX);
    source_path.with_file_name(name)
}

/// Whether a sidecar already exists for this source file.
/// Drives incremental extraction: existing sidecars are skipped unless
/// overwrite is requested.
pub fn units_file_exists<P: AsRef<Path>>(source_path: P) -> bool {
    units_file_path(source_path.as_ref()).exists()
}

/// Write the parse result as a pretty-printed sidecar document.
pub fn write_units_file(source_path: &Path, parsed: &ParseResult) -> Result<PathBuf> {
    let path = units_file_path(source_path);
    let content = serde_json::to_string_pretty(parsed)?;
    fs::write(&path, content)
        .with_context(|| format!("failed to write units file {}", path.display()))?;
    Ok(path)
}

/// Read a sidecar document back, including any edits made to unit payloads.
pub fn read_units_file(source_path: &Path) -> Result<ParseResult> {
    let path = units_file_path(source_path);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read units file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("malformed units file {}", path.display()))
}

/// Async sidecar read for pipeline use.
pub async fn read_units_file_async(source_path: &Path) -> Result<ParseResult> {
    let path = units_file_path(source_path);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(e).with_context(|| format!("no units file at {}", path.display()));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read units file {}", path.display()));
        }
    };
    serde_json::from_str(&content)
        .with_context(|| format!("malformed units file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::{TextSpan, TextUnit};
    use tempfile::TempDir;

    fn sample_result() -> ParseResult {
        ParseResult {
            engine_id: "kirikiri.ks".into(),
            source_path: "a.ks".into(),
            encoding: "UTF-8".into(),
            units: vec![TextUnit {
                id: "a.ks:0".into(),
                text: "Hello.\n".into(),
                speaker: Some("Alice".into()),
                meta: [("terminator".to_string(), "\n".to_string())].into(),
            }],
            spans: vec![TextSpan { id: "a.ks:0".into(), start: 18, end: 25 }],
        }
    }

    #[test]
    fn sidecar_path_appends_suffix() {
        assert_eq!(
            units_file_path(Path::new("dir/01_01.ks")),
            PathBuf::from("dir/01_01.ks.units.json")
        );
    }

    #[test]
    fn write_then_read_roundtrips_the_document() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.ks");
        let parsed = sample_result();

        assert!(!units_file_exists(&source));
        write_units_file(&source, &parsed).unwrap();
        assert!(units_file_exists(&source));

        let loaded = read_units_file(&source).unwrap();
        assert_eq!(loaded, parsed);
    }

    #[tokio::test]
    async fn async_read_matches_sync() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.ks");
        write_units_file(&source, &sample_result()).unwrap();
        let loaded = read_units_file_async(&source).await.unwrap();
        assert_eq!(loaded, sample_result());
    }

    #[tokio::test]
    async fn async_read_missing_sidecar_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("missing.ks");
        assert!(read_units_file_async(&source).await.is_err());
    }
}
