// Parallel per-file processing for the extract and inject commands.
// Parsing and reconstruction are pure per-document computations, so files
// are processed concurrently with zero coordination; only the registry is
// shared, read-only.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ParserError;
use crate::registry::{verify_round_trip, EngineRegistry};
use crate::sidecar;

/// Options for the extract pass.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Redo files whose sidecar already exists.
    pub overwrite_all: bool,
    /// Abort the whole run on the first failed file.
    pub fail_fast: bool,
    /// Verify the identity round-trip after parsing; a mismatch fails the file.
    pub strict: bool,
    /// Force a specific engine id instead of per-file detection.
    pub engine: Option<String>,
    /// Maximum files in flight.
    pub concurrency: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite_all: false,
            fail_fast: false,
            strict: false,
            engine: None,
            concurrency: num_cpus::get(),
        }
    }
}

/// Options for the inject pass.
#[derive(Debug, Clone)]
pub struct InjectOptions {
    /// Overwrite the source file instead of writing `<file>.out`.
    pub in_place: bool,
    pub fail_fast: bool,
    pub concurrency: usize,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self {
            in_place: false,
            fail_fast: false,
            concurrency: num_cpus::get(),
        }
    }
}

/// Per-file processing statistics.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileStats {
    /// File path as discovered.
    pub path: String,
    /// Engine that handled the file, when one was found.
    pub engine_id: Option<String>,
    /// Number of text units extracted or injected.
    pub units: u64,
    /// Characters across unit payloads.
    pub chars_processed: u64,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Processing status (success, skipped, failed).
    pub status: String,
    /// Error message if processing failed.
    pub error: Option<String>,
}

impl FileStats {
    fn started(path: &Path) -> Self {
        Self {
            path: path.display().to_string(),
            engine_id: None,
            units: 0,
            chars_processed: 0,
            processing_time_ms: 0,
            status: "failed".to_string(),
            error: None,
        }
    }

    fn failed(mut self, started: Instant, error: String) -> Self {
        warn!(path = %self.path, %error, "file processing failed");
        self.processing_time_ms = started.elapsed().as_millis() as u64;
        self.status = "failed".to_string();
        self.error = Some(error);
        self
    }

    fn skipped(mut self, started: Instant, reason: &str) -> Self {
        debug!(path = %self.path, reason, "file skipped");
        self.processing_time_ms = started.elapsed().as_millis() as u64;
        self.status = "skipped".to_string();
        self
    }

    fn succeeded(mut self, started: Instant) -> Self {
        self.processing_time_ms = started.elapsed().as_millis() as u64;
        self.status = "success".to_string();
        self
    }
}

/// Aggregate statistics for one run, serialized to the stats output path.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunStats {
    pub total_files: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_units: u64,
    pub total_time_ms: u64,
    pub files: Vec<FileStats>,
}

impl RunStats {
    pub fn from_file_stats(files: Vec<FileStats>, total_time_ms: u64) -> Self {
        Self {
            total_files: files.len(),
            succeeded: files.iter().filter(|f| f.status == "success").count(),
            skipped: files.iter().filter(|f| f.status == "skipped").count(),
            failed: files.iter().filter(|f| f.status == "failed").count(),
            total_units: files.iter().map(|f| f.units).sum(),
            total_time_ms,
            files,
        }
    }
}

/// Write run statistics as pretty-printed JSON.
pub async fn write_run_stats(path: &Path, stats: &RunStats) -> Result<()> {
    let content = serde_json::to_string_pretty(stats)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("failed to write stats file {}", path.display()))?;
    info!("Run stats written to {}", path.display());
    Ok(())
}

/// Extract units from every file, writing one sidecar per file.
/// Returns per-file stats; with `fail_fast` the first failure aborts the run.
pub async fn extract_files(
    registry: &EngineRegistry,
    files: &[PathBuf],
    options: &ExtractOptions,
    progress: Option<ProgressBar>,
) -> Result<Vec<FileStats>> {
    let results = stream::iter(files.iter())
        .map(|path| {
            let progress = progress.clone();
            async move {
                let stats = extract_one(registry, path, options).await;
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                stats
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect::<Vec<FileStats>>()
        .await;

    if options.fail_fast {
        if let Some(failed) = results.iter().find(|s| s.status == "failed") {
            anyhow::bail!(
                "extraction failed for {}: {}",
                failed.path,
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(results)
}

async fn extract_one(registry: &EngineRegistry, path: &Path, options: &ExtractOptions) -> FileStats {
    let started = Instant::now();
    let mut stats = FileStats::started(path);

    if !options.overwrite_all && sidecar::units_file_exists(path) {
        return stats.skipped(started, "units file already exists");
    }

    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) => return stats.failed(started, format!("read failed: {e}")),
    };

    let path_str = path.display().to_string();
    let parser = match &options.engine {
        Some(engine_id) => match registry.get(engine_id) {
            Ok(parser) => parser,
            Err(e) => return stats.failed(started, e.to_string()),
        },
        None => match registry.parser_for_path(&path_str, &data) {
            Some((_, parser)) => parser,
            None => {
                let err = ParserError::UnsupportedFormat {
                    path: path_str,
                    reason: "no registered dialect recognizes this file".to_string(),
                };
                return stats.failed(started, err.to_string());
            }
        },
    };
    stats.engine_id = Some(parser.engine_id().to_string());

    let parsed = if options.strict {
        match verify_round_trip(parser.as_ref(), &data, &path_str) {
            Ok(parsed) => parsed,
            Err(e) => return stats.failed(started, e.to_string()),
        }
    } else {
        match parser.parse(&data, &path_str) {
            Ok(parsed) => parsed,
            Err(e) => return stats.failed(started, e.to_string()),
        }
    };

    stats.units = parsed.units.len() as u64;
    stats.chars_processed = parsed.chars_extracted();

    match sidecar::write_units_file(path, &parsed) {
        Ok(sidecar_path) => {
            debug!(path = %path.display(), sidecar = %sidecar_path.display(), "units extracted");
            stats.succeeded(started)
        }
        Err(e) => stats.failed(started, e.to_string()),
    }
}

/// Splice edited sidecar units back into every file that has a sidecar.
pub async fn inject_files(
    registry: &EngineRegistry,
    files: &[PathBuf],
    options: &InjectOptions,
    progress: Option<ProgressBar>,
) -> Result<Vec<FileStats>> {
    let results = stream::iter(files.iter())
        .map(|path| {
            let progress = progress.clone();
            async move {
                let stats = inject_one(registry, path, options).await;
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                stats
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect::<Vec<FileStats>>()
        .await;

    if options.fail_fast {
        if let Some(failed) = results.iter().find(|s| s.status == "failed") {
            anyhow::bail!(
                "injection failed for {}: {}",
                failed.path,
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(results)
}

/// Output path for injected bytes: the source itself in-place, `<file>.out`
/// otherwise.
pub fn inject_output_path(source_path: &Path, in_place: bool) -> PathBuf {
    if in_place {
        return source_path.to_path_buf();
    }
    let mut name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    name.push_str(".out");
    source_path.with_file_name(name)
}

async fn inject_one(registry: &EngineRegistry, path: &Path, options: &InjectOptions) -> FileStats {
    let started = Instant::now();
    let mut stats = FileStats::started(path);

    if !sidecar::units_file_exists(path) {
        return stats.skipped(started, "no units file");
    }

    let doc = match sidecar::read_units_file_async(path).await {
        Ok(doc) => doc,
        Err(e) => return stats.failed(started, e.to_string()),
    };
    stats.engine_id = Some(doc.engine_id.clone());
    stats.units = doc.units.len() as u64;
    stats.chars_processed = doc.chars_extracted();

    let parser = match registry.get(&doc.engine_id) {
        Ok(parser) => parser,
        Err(e) => return stats.failed(started, e.to_string()),
    };

    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) => return stats.failed(started, format!("read failed: {e}")),
    };

    let output = match parser.export(&data, &doc, &doc.units) {
        Ok(output) => output,
        Err(e) => return stats.failed(started, e.to_string()),
    };

    let out_path = inject_output_path(path, options.in_place);
    match tokio::fs::write(&out_path, output).await {
        Ok(()) => {
            debug!(path = %path.display(), out = %out_path.display(), "units injected");
            stats.succeeded(started)
        }
        Err(e) => stats.failed(started, format!("write failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines;
    use tempfile::TempDir;

    const SCRIPT: &str = "[cn name=\"Alice\"]\nHello there.\n";

    #[tokio::test]
    async fn extract_writes_sidecar_and_reports_success() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ks");
        tokio::fs::write(&file, SCRIPT).await.unwrap();

        let registry = engines::builtin_registry();
        let stats = extract_files(&registry, &[file.clone()], &ExtractOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].status, "success");
        assert_eq!(stats[0].units, 1);
        assert_eq!(stats[0].engine_id.as_deref(), Some("kirikiri.ks"));
        assert!(sidecar::units_file_exists(&file));
    }

    #[tokio::test]
    async fn extract_skips_existing_sidecar_unless_overwrite() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ks");
        tokio::fs::write(&file, SCRIPT).await.unwrap();

        let registry = engines::builtin_registry();
        let options = ExtractOptions::default();
        extract_files(&registry, &[file.clone()], &options, None).await.unwrap();

        let second = extract_files(&registry, &[file.clone()], &options, None).await.unwrap();
        assert_eq!(second[0].status, "skipped");

        let overwrite = ExtractOptions { overwrite_all: true, ..ExtractOptions::default() };
        let third = extract_files(&registry, &[file], &overwrite, None).await.unwrap();
        assert_eq!(third[0].status, "success");
    }

    #[tokio::test]
    async fn extract_with_empty_registry_reports_no_parser() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ks");
        tokio::fs::write(&file, SCRIPT).await.unwrap();

        let registry = crate::registry::EngineRegistry::new();
        let stats = extract_files(&registry, &[file], &ExtractOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(stats[0].status, "failed");
        let error = stats[0].error.as_deref().unwrap();
        assert!(error.starts_with("unsupported format for "), "{error}");
        assert!(error.contains("no registered dialect"), "{error}");
    }

    #[tokio::test]
    async fn fail_fast_aborts_on_failed_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ks");
        tokio::fs::write(&file, SCRIPT).await.unwrap();

        let registry = crate::registry::EngineRegistry::new();
        let options = ExtractOptions { fail_fast: true, ..ExtractOptions::default() };
        assert!(extract_files(&registry, &[file], &options, None).await.is_err());
    }

    #[tokio::test]
    async fn inject_without_sidecar_is_skipped() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ks");
        tokio::fs::write(&file, SCRIPT).await.unwrap();

        let registry = engines::builtin_registry();
        let stats = inject_files(&registry, &[file], &InjectOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(stats[0].status, "skipped");
    }

    #[tokio::test]
    async fn extract_then_inject_roundtrips_unedited() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ks");
        tokio::fs::write(&file, SCRIPT).await.unwrap();

        let registry = engines::builtin_registry();
        extract_files(&registry, &[file.clone()], &ExtractOptions::default(), None)
            .await
            .unwrap();
        let stats = inject_files(&registry, &[file.clone()], &InjectOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(stats[0].status, "success");

        let out = tokio::fs::read(inject_output_path(&file, false)).await.unwrap();
        assert_eq!(out, SCRIPT.as_bytes());
    }

    #[tokio::test]
    async fn inject_with_tampered_span_fails_the_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ks");
        tokio::fs::write(&file, SCRIPT).await.unwrap();

        let registry = engines::builtin_registry();
        extract_files(&registry, &[file.clone()], &ExtractOptions::default(), None)
            .await
            .unwrap();

        // Push a recorded span past the end of the source, the way a
        // hand-edited units file (or a source rewritten after extraction)
        // would.
        let mut doc = sidecar::read_units_file(&file).unwrap();
        doc.spans[0].end = 9999;
        sidecar::write_units_file(&file, &doc).unwrap();

        let stats = inject_files(&registry, &[file.clone()], &InjectOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(stats[0].status, "failed");
        assert!(stats[0].error.as_deref().unwrap().contains("out of range"));
        assert!(!inject_output_path(&file, false).exists());
    }

    #[tokio::test]
    async fn run_stats_aggregate_counts() {
        let files = vec![
            FileStats {
                path: "a.ks".into(),
                engine_id: Some("kirikiri.ks".into()),
                units: 3,
                chars_processed: 42,
                processing_time_ms: 1,
                status: "success".into(),
                error: None,
            },
            FileStats {
                path: "b.ks".into(),
                engine_id: None,
                units: 0,
                chars_processed: 0,
                processing_time_ms: 0,
                status: "skipped".into(),
                error: None,
            },
        ];
        let stats = RunStats::from_file_stats(files, 5);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.total_units, 3);
    }
}
