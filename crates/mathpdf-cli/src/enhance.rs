//! Enhance command implementation for mathpdf CLI.
//!
//! Queues the given PDFs, runs them as one batch on a worker pool, and writes
//! the result (a single PDF or a ZIP archive) to the output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, ValueEnum};
use mathpdf_core::batch::{DEFAULT_ARCHIVE_NAME, default_worker_count};
use mathpdf_core::config::parse_keywords;
use mathpdf_core::{
    AbortHandle, BatchCallback, BatchCoordinator, BatchReport, BatchRunner, BatchSummary, Delivery,
    EnhanceConfig, JobFailure, JobInfo, LayoutMode, MarginSide, ProcessSpawner, Progress,
    RunnerConfig, ThreadSpawner, UnitSpawner, ZipBundler,
};

use crate::colors;
use crate::settings;
use crate::sink::DirectorySink;

#[derive(Args)]
pub struct EnhanceArgs {
    /// PDF files or directories containing PDFs
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory the enhanced output is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Number of workers (defaults to available parallelism)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Settings file to start from
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Save the effective settings back to the settings file
    #[arg(long)]
    pub save_settings: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Run transforms on threads instead of worker processes
    #[arg(long)]
    pub in_process: bool,

    /// Seconds workers get to start; 0 waits forever
    #[arg(long, default_value_t = 30)]
    pub ready_timeout: u64,

    /// Name of the archive written for multi-file batches
    #[arg(long, default_value = DEFAULT_ARCHIVE_NAME)]
    pub archive_name: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Fixed,
    Tablet,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SideArg {
    Right,
    Left,
    Alternating,
}

/// Command line overrides for individual settings.
#[derive(Args, Default)]
pub struct ConfigOverrides {
    /// Layout mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Side receiving the margin
    #[arg(long, value_enum)]
    pub side: Option<SideArg>,

    /// Fixed margin width in points
    #[arg(long)]
    pub margin: Option<u32>,

    /// Tablet screen width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Tablet screen height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Tablet vertical padding in points
    #[arg(long)]
    pub epsilon: Option<u32>,

    /// Comma separated theorem keywords
    #[arg(long)]
    pub keywords: Option<String>,

    /// Theorem highlight color (#rrggbb)
    #[arg(long)]
    pub highlight_color: Option<String>,

    /// Do not draw boxes around theorem blocks
    #[arg(long)]
    pub no_boxes: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut EnhanceConfig) {
        if let Some(mode) = self.mode {
            config.mode = match mode {
                ModeArg::Fixed => LayoutMode::Fixed,
                ModeArg::Tablet => LayoutMode::Tablet,
            };
        }
        if let Some(side) = self.side {
            config.side = match side {
                SideArg::Right => MarginSide::Right,
                SideArg::Left => MarginSide::Left,
                SideArg::Alternating => MarginSide::Alternating,
            };
        }
        if let Some(margin) = self.margin {
            config.margin_pt = margin;
        }
        if let Some(width) = self.width {
            config.tablet.width = width;
        }
        if let Some(height) = self.height {
            config.tablet.height = height;
        }
        if let Some(epsilon) = self.epsilon {
            config.tablet.epsilon_pt = epsilon;
        }
        if let Some(keywords) = &self.keywords {
            config.theorem_detection.keywords = parse_keywords(keywords);
        }
        if let Some(color) = &self.highlight_color {
            config.theorem_detection.highlight_color = color.clone();
        }
        if self.no_boxes {
            config.theorem_detection.draw_boxes = false;
        }
    }
}

/// Execute the enhance command.
pub async fn execute(args: EnhanceArgs) -> anyhow::Result<()> {
    let settings_path = settings::resolve(args.settings.as_deref());
    let mut config = EnhanceConfig::load_or_default(&settings_path)?;
    args.overrides.apply(&mut config);
    let config = config.validate()?;

    if args.save_settings {
        config.save(&settings_path)?;
        println!("Saved settings to {}", settings_path.display());
    }

    let files = collect_pdfs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No valid PDF files found");
    }

    let coordinator = BatchCoordinator::new(ZipBundler, DirectorySink::new(&args.output)?)
        .with_archive_name(args.archive_name.as_str());
    let runner_config = RunnerConfig {
        workers: args.workers.unwrap_or_else(default_worker_count).max(1),
        ready_timeout: (args.ready_timeout > 0).then(|| Duration::from_secs(args.ready_timeout)),
    };

    println!(
        "\n{}mathpdf{} - Enhancing {}{} file(s){} ({} mode, {} workers)",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        files.len(),
        colors::RESET,
        mode_name(config.mode),
        runner_config.workers
    );
    println!("{}", "─".repeat(50));

    let report = if args.in_process {
        run_batch(ThreadSpawner::enhancer(), runner_config, coordinator, files, config).await?
    } else {
        let spawner = ProcessSpawner::locate()?;
        tracing::debug!("Using worker binary {}", spawner.worker_path().display());
        run_batch(spawner, runner_config, coordinator, files, config).await?
    };

    println!("{}", "─".repeat(50));
    match report {
        BatchReport::Completed(summary) => print_summary(summary, &args.output),
        BatchReport::Cancelled(cancelled) => {
            println!(
                "{}Batch processing cancelled.{} {} of {} finished, nothing written",
                colors::YELLOW,
                colors::RESET,
                cancelled.completed,
                cancelled.total
            );
            Ok(())
        }
    }
}

async fn run_batch<S: UnitSpawner>(
    spawner: S,
    runner_config: RunnerConfig,
    coordinator: BatchCoordinator,
    files: Vec<PathBuf>,
    config: EnhanceConfig,
) -> anyhow::Result<BatchReport> {
    let mut runner = BatchRunner::new(spawner, runner_config, coordinator);
    runner.set_callback(TerminalProgress);
    let count = files.len();
    for file in files {
        runner.enqueue_file(file);
    }
    println!("Queued {} file(s)", count);

    let abort = AbortHandle::new();
    let on_signal = abort.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.abort();
        }
    });

    let result = runner.run(config, &abort).await;
    signal.abort();
    let report = result?;
    if matches!(report, BatchReport::Completed(_)) {
        runner.shutdown()?;
    }
    Ok(report)
}

fn print_summary(summary: BatchSummary, output: &Path) -> anyhow::Result<()> {
    match &summary.delivery {
        Delivery::Single(name) => println!(
            "{}Wrote{} {}",
            colors::GREEN,
            colors::RESET,
            output.join(name).display()
        ),
        Delivery::Archive { name, entries } => println!(
            "{}Wrote{} {} ({} documents)",
            colors::GREEN,
            colors::RESET,
            output.join(name).display(),
            entries
        ),
        Delivery::Nothing => {}
    }

    if !summary.failures.is_empty() {
        println!(
            "{}{} file(s) failed:{}",
            colors::RED,
            summary.failures.len(),
            colors::RESET
        );
        for failure in &summary.failures {
            println!("  {} ({})", failure, failure.kind);
        }
    }

    println!(
        "{}Completed{} {} of {} in {:.2}s",
        colors::GREEN,
        colors::RESET,
        summary.succeeded(),
        summary.total,
        summary.elapsed.as_secs_f64()
    );

    if let Some(err) = summary.delivery_error {
        return Err(err.into());
    }
    if summary.succeeded() == 0 {
        anyhow::bail!("No documents were enhanced");
    }
    Ok(())
}

/// Prints one line per finished job.
struct TerminalProgress;

impl BatchCallback for TerminalProgress {
    fn on_engine_online(&self, workers: usize) {
        println!(
            "  {}Engine online ({} workers){}",
            colors::CYAN,
            workers,
            colors::RESET
        );
    }

    fn on_job_completed(&self, job: &JobInfo, progress: Progress) {
        println!(
            "  {}✓{} {} {}[{}]{}",
            colors::GREEN,
            colors::RESET,
            job.name,
            colors::DIM,
            progress,
            colors::RESET
        );
    }

    fn on_job_failed(&self, failure: &JobFailure, progress: Progress) {
        println!(
            "  {}✗{} {} {}[{}]{}",
            colors::RED,
            colors::RESET,
            failure,
            colors::DIM,
            progress,
            colors::RESET
        );
    }

    fn on_batch_cancelled(&self, progress: Progress) {
        println!("  {}cancelled{} at {}", colors::YELLOW, colors::RESET, progress);
    }
}

fn mode_name(mode: LayoutMode) -> &'static str {
    match mode {
        LayoutMode::Fixed => "fixed",
        LayoutMode::Tablet => "tablet",
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Expand inputs into PDF files, skipping anything else.
///
/// Directories contribute their PDFs (not recursively) in name order.
fn collect_pdfs(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_pdf(path))
                .collect();
            found.sort();
            files.extend(found);
        } else if is_pdf(input) {
            files.push(input.clone());
        } else {
            tracing::warn!("Skipping {} (not a PDF)", input.display());
        }
    }
    Ok(files)
}
