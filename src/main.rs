use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;

use vnsplice::discovery;
use vnsplice::engines;
use vnsplice::pipeline::{self, ExtractOptions, InjectOptions, RunStats};
use vnsplice::registry::EngineRegistry;

#[derive(Parser, Debug)]
#[command(name = "vnsplice")]
#[command(about = "Round-trip text extractor and injector for visual novel scripts")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract translatable units from script files into .units.json sidecars
    Extract {
        /// Root directory to scan for script files
        root_dir: PathBuf,

        /// Overwrite even files that already have a sidecar
        #[arg(long)]
        overwrite_all: bool,

        /// Abort on first error
        #[arg(long)]
        fail_fast: bool,

        /// Verify the identity round-trip for every file; mismatches fail the file
        #[arg(long)]
        strict: bool,

        /// Force a specific engine id instead of per-file detection
        #[arg(long)]
        engine: Option<String>,

        /// Suppress console progress bar
        #[arg(long)]
        no_progress: bool,

        /// Stats output file path
        #[arg(long, default_value = "run_stats.json")]
        stats_out: PathBuf,
    },

    /// Splice edited sidecar units back into script files
    Inject {
        /// Root directory to scan for script files with sidecars
        root_dir: PathBuf,

        /// Overwrite the source files instead of writing <file>.out
        #[arg(long)]
        in_place: bool,

        /// Abort on first error
        #[arg(long)]
        fail_fast: bool,

        /// Suppress console progress bar
        #[arg(long)]
        no_progress: bool,

        /// Stats output file path
        #[arg(long, default_value = "run_stats.json")]
        stats_out: PathBuf,
    },

    /// List registered engines and any registration failures
    Engines,
}

#[tokio::main]
async fn main() -> Result<()> {
    // WHY: structured JSON logging enables observability and debugging in production
    tracing_subscriber::fmt()
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();

    info!("Starting vnsplice");
    info!(?args, "Parsed CLI arguments");

    let registry = engines::builtin_registry();

    match args.command {
        Command::Extract {
            root_dir,
            overwrite_all,
            fail_fast,
            strict,
            engine,
            no_progress,
            stats_out,
        } => {
            validate_root(&root_dir)?;
            let files = discover(&registry, &root_dir, fail_fast).await?;
            let options = ExtractOptions {
                overwrite_all,
                fail_fast,
                strict,
                engine,
                ..ExtractOptions::default()
            };

            let started = std::time::Instant::now();
            let progress = make_progress(files.len(), no_progress);
            let stats = pipeline::extract_files(&registry, &files, &options, progress.clone()).await?;
            if let Some(pb) = progress {
                pb.finish_and_clear();
            }

            let run = RunStats::from_file_stats(stats, started.elapsed().as_millis() as u64);
            pipeline::write_run_stats(&stats_out, &run).await?;
            print_summary("Extraction", &run);
        }

        Command::Inject { root_dir, in_place, fail_fast, no_progress, stats_out } => {
            validate_root(&root_dir)?;
            let files = discover(&registry, &root_dir, fail_fast).await?;
            let options = InjectOptions { in_place, fail_fast, ..InjectOptions::default() };

            let started = std::time::Instant::now();
            let progress = make_progress(files.len(), no_progress);
            let stats = pipeline::inject_files(&registry, &files, &options, progress.clone()).await?;
            if let Some(pb) = progress {
                pb.finish_and_clear();
            }

            let run = RunStats::from_file_stats(stats, started.elapsed().as_millis() as u64);
            pipeline::write_run_stats(&stats_out, &run).await?;
            print_summary("Injection", &run);
        }

        Command::Engines => {
            for id in registry.list() {
                println!("{id}");
            }
            for (id, error) in registry.failures() {
                println!("{id}\tFAILED: {error}");
            }
        }
    }

    Ok(())
}

/// Validate root directory exists early to fail fast with clear error.
fn validate_root(root_dir: &Path) -> Result<()> {
    if !root_dir.exists() {
        anyhow::bail!("Root directory does not exist: {}", root_dir.display());
    }
    if !root_dir.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", root_dir.display());
    }
    Ok(())
}

async fn discover(
    registry: &EngineRegistry,
    root_dir: &Path,
    fail_fast: bool,
) -> Result<Vec<PathBuf>> {
    let extensions = registry.extensions();
    if extensions.is_empty() {
        // Tolerated: zero engines registered means zero candidate files.
        info!("No engines registered; nothing to discover");
        return Ok(Vec::new());
    }

    info!("Starting file discovery in: {}", root_dir.display());
    let config = discovery::DiscoveryConfig { fail_fast, extensions };
    let discovered = discovery::collect_script_files(root_dir, config).await?;

    let valid: Vec<PathBuf> = discovered
        .iter()
        .filter(|f| f.error.is_none())
        .map(|f| f.path.clone())
        .collect();
    let invalid = discovered.len() - valid.len();

    info!("File discovery completed: {} total files found", discovered.len());
    if invalid > 0 {
        info!("Files with issues: {}", invalid);
        for file in discovered.iter().filter(|f| f.error.is_some()) {
            if let Some(ref error) = file.error {
                info!("Issue with {}: {}", file.path.display(), error);
            }
        }
    }

    println!("Found {} script files ({} with issues)", discovered.len(), invalid);
    Ok(valid)
}

fn make_progress(len: usize, no_progress: bool) -> Option<ProgressBar> {
    if no_progress {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    Some(pb)
}

fn print_summary(label: &str, run: &RunStats) {
    println!("{label} complete:");
    println!("  Processed: {} files", run.succeeded);
    println!("  Skipped: {} files", run.skipped);
    if run.failed > 0 {
        println!("  Failed: {} files", run.failed);
        for file in run.files.iter().filter(|f| f.status == "failed") {
            if let Some(ref error) = file.error {
                println!("    {}: {}", file.path, error);
            }
        }
    }
    println!("  Total units: {}", run.total_units);
    println!("  Total time: {}ms", run.total_time_ms);
}
