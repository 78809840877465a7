use anyhow::Result;
use futures::stream::{Stream, StreamExt};
use futures::stream;
use glob::glob;
use ignore::{WalkBuilder, WalkState};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for script file discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Whether to fail fast on first error or continue processing.
    pub fail_fast: bool,
    /// File extensions (lowercase, without dot) to look for; normally the
    /// union of extensions claimed by registered engines.
    pub extensions: Vec<String>,
}

/// Result of file discovery validation.
#[derive(Debug, Clone)]
pub struct FileValidation {
    pub path: PathBuf,
    pub error: Option<String>,
}

/// Discovers all files with a registered script extension recursively under
/// the given root directory. Returns an async stream of validated paths.
pub fn discover_script_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> impl Stream<Item = Result<FileValidation>> {
    let root_path = root_dir.as_ref().to_path_buf();

    futures::stream::unfold(
        DiscoveryState::new(root_path, config),
        |mut state| async move { state.next_file().await.map(|result| (result, state)) },
    )
}

/// Parallel directory traversal for large trees.
/// WHY: the `ignore` walker fans directory reads out across threads while the
/// glob stream is inherently sequential.
pub fn discover_script_files_parallel(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> impl Stream<Item = Result<FileValidation>> {
    let root_path = root_dir.as_ref().to_path_buf();
    let config = Arc::new(config);

    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        info!("Starting directory traversal in: {}", root_path.display());
        let traversal_start = std::time::Instant::now();

        let walker = WalkBuilder::new(&root_path)
            .threads((num_cpus::get() / 2).max(1))
            .follow_links(false)
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .build_parallel();

        let (result_tx, result_rx) = std::sync::mpsc::channel();
        let tx_clone = tx.clone();
        let extensions = config.extensions.clone();

        // Walker runs on its own thread pool; results stream back immediately.
        std::thread::spawn(move || {
            walker.run(|| {
                let result_tx = result_tx.clone();
                let extensions = extensions.clone();
                Box::new(move |result| {
                    if let Ok(entry) = result {
                        if entry.file_type().is_some_and(|ft| ft.is_file())
                            && has_script_extension(entry.path(), &extensions)
                        {
                            debug!("Found matching file: {}", entry.path().display());
                            let _ = result_tx.send(entry.path().to_path_buf());
                        }
                    }
                    WalkState::Continue
                })
            });
            drop(result_tx);
        });

        let mut file_count = 0;
        while let Ok(path) = result_rx.recv() {
            file_count += 1;

            match validate_file(&path, config.fail_fast).await {
                Ok(validation) => {
                    if tx_clone.send(Ok(validation)).is_err() {
                        debug!("Receiver dropped, stopping discovery");
                        break;
                    }
                }
                Err(e) => {
                    if config.fail_fast {
                        if tx_clone.send(Err(e)).is_err() {
                            debug!("Receiver dropped, stopping discovery");
                        }
                        break;
                    } else {
                        warn!("File validation error (continuing): {}", e);
                    }
                }
            }
        }

        let traversal_time = traversal_start.elapsed();
        info!(
            "Discovery and validation completed in {:.2}ms, streamed {} files",
            traversal_time.as_millis(),
            file_count
        );

        drop(tx_clone);
    });

    stream::unfold(rx, |mut receiver| async move {
        receiver.recv().await.map(|result| (result, receiver))
    })
}

fn has_script_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

/// Check that a discovered path is an accessible regular file.
async fn validate_file(path: &Path, fail_fast: bool) -> Result<FileValidation> {
    match fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_file() {
                let error = format!("Path is not a file: {}", path.display());
                warn!("{}", error);
                return Ok(FileValidation {
                    path: path.to_path_buf(),
                    error: Some(error),
                });
            }
        }
        Err(e) => {
            let error = format!("Cannot access file {}: {}", path.display(), e);
            warn!("{}", error);

            if fail_fast {
                return Err(anyhow::anyhow!(error));
            } else {
                return Ok(FileValidation {
                    path: path.to_path_buf(),
                    error: Some(error),
                });
            }
        }
    }

    // Encoding validation happens in the parser's encoding resolver, which
    // never fails; nothing more to pre-validate here.
    Ok(FileValidation {
        path: path.to_path_buf(),
        error: None,
    })
}

/// Internal state for sequential glob-based discovery, one pattern per
/// registered extension.
struct DiscoveryState {
    config: DiscoveryConfig,
    pending_patterns: VecDeque<String>,
    glob_iter: Option<glob::Paths>,
}

impl DiscoveryState {
    fn new(root_dir: PathBuf, config: DiscoveryConfig) -> Self {
        let pending_patterns = config
            .extensions
            .iter()
            .map(|ext| format!("{}/**/*.{ext}", root_dir.display()))
            .collect();
        Self {
            config,
            pending_patterns,
            glob_iter: None,
        }
    }

    async fn next_file(&mut self) -> Option<Result<FileValidation>> {
        loop {
            if self.glob_iter.is_none() {
                let pattern = self.pending_patterns.pop_front()?;
                debug!("Starting file discovery with pattern: {}", pattern);
                match glob(&pattern) {
                    Ok(paths) => self.glob_iter = Some(paths),
                    Err(e) => {
                        return Some(Err(anyhow::anyhow!("Failed to create glob pattern: {}", e)));
                    }
                }
            }

            match self.glob_iter.as_mut().and_then(|it| it.next()) {
                Some(Ok(path)) => {
                    debug!("Found file: {}", path.display());
                    return Some(validate_file(&path, self.config.fail_fast).await);
                }
                Some(Err(e)) => {
                    let error_msg = format!("Glob iteration error: {e}");
                    warn!("{}", error_msg);
                    if self.config.fail_fast {
                        return Some(Err(anyhow::anyhow!(error_msg)));
                    }
                    // Continue to the next candidate on non-fatal glob errors.
                }
                None => {
                    // Current pattern exhausted; move on to the next one.
                    self.glob_iter = None;
                    if self.pending_patterns.is_empty() {
                        info!("File discovery completed");
                        return None;
                    }
                }
            }
        }
    }
}

/// Collect all discovered files into a Vec for easier processing.
pub async fn collect_script_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> Result<Vec<FileValidation>> {
    let mut files = Vec::new();
    let mut stream = Box::pin(discover_script_files(root_dir, config));

    while let Some(result) = stream.next().await {
        files.push(result?);
    }

    let valid_count = files.iter().filter(|f| f.error.is_none()).count();
    let invalid_count = files.len() - valid_count;
    if invalid_count > 0 {
        warn!("Found {} files with validation issues", invalid_count);
    }
    info!("File discovery summary: {} valid, {} invalid", valid_count, invalid_count);

    Ok(files)
}

/// Collect all discovered files using parallel directory traversal.
pub async fn collect_script_files_parallel(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> Result<Vec<FileValidation>> {
    let mut files = Vec::new();
    let mut stream = Box::pin(discover_script_files_parallel(root_dir, config));

    while let Some(result) = stream.next().await {
        files.push(result?);
    }

    let valid_count = files.iter().filter(|f| f.error.is_none()).count();
    info!(
        "Parallel file discovery summary: {} valid, {} invalid",
        valid_count,
        files.len() - valid_count
    );

    Ok(files)
}

/// Convenience: all valid script paths under a root, sorted for stable
/// processing order.
pub async fn find_script_files<P: AsRef<Path>>(
    root_dir: P,
    extensions: Vec<String>,
) -> Result<Vec<PathBuf>> {
    let config = DiscoveryConfig { fail_fast: false, extensions };
    let validations = collect_script_files(root_dir, config).await?;

    let mut valid_files: Vec<PathBuf> = validations
        .into_iter()
        .filter(|v| v.error.is_none())
        .map(|v| v.path)
        .collect();
    valid_files.sort();

    Ok(valid_files)
}
