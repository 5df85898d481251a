//! Tacet command-line entry point.
//!
//! Two subcommands mirror the two ways the engine is used:
//!
//! ```text
//! tacet process <file> [-o DIR] [--vad] [--parallel-search] ...
//! tacet batch <dir>    [-o DIR] [--workers N] ...
//! ```
//!
//! Output files get a `-desilenced` suffix next to the input (or inside
//! `-o DIR`). Exit code 0 means at least one file succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use tacet_core::{
    BatchJob, BatchOrchestrator, Coordinator, EngineConfig, FileOutcome, MergePolicy, ModelHandle,
    SileroVad,
};

/// Extensions considered audio when scanning a batch directory.
const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "ogg", "m4a"];

/// Suffix appended to output file stems.
const OUTPUT_SUFFIX: &str = "-desilenced";

#[derive(Parser)]
#[command(name = "tacet", version, about = "Remove silence from audio recordings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a single audio file
    Process {
        /// Input audio file
        input: PathBuf,
        /// Output directory (defaults to the input's directory)
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        opts: DetectOpts,
    },
    /// Process every audio file under a directory
    Batch {
        /// Input directory, scanned recursively
        input_dir: PathBuf,
        /// Output directory (defaults to each input's directory)
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        opts: DetectOpts,
    },
}

#[derive(Args)]
struct DetectOpts {
    /// Use the Silero VAD model instead of energy thresholding
    #[arg(long)]
    vad: bool,
    /// Speech-probability threshold for VAD mode (0.0-1.0)
    #[arg(long, default_value_t = 0.5)]
    vad_threshold: f32,
    /// Minimum silence length in milliseconds
    #[arg(long, default_value_t = 1000)]
    min_silence_ms: u64,
    /// Maximum segment duration in milliseconds
    #[arg(long, default_value_t = 5000)]
    max_segment_ms: u64,
    /// Energy-mode frame length in milliseconds
    #[arg(long, default_value_t = 20)]
    frame_ms: u64,
    /// Evaluate energy thresholds in parallel (energy mode only)
    #[arg(long)]
    parallel_search: bool,
    /// Use adaptive bisection instead of the preset threshold list
    #[arg(long)]
    adaptive: bool,
    /// Worker count for batch processing (defaults to the CPU count)
    #[arg(long)]
    workers: Option<usize>,
    /// Emit the full report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl DetectOpts {
    fn engine_config(&self) -> EngineConfig {
        let workers = self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        EngineConfig {
            use_vad: self.vad,
            policy: MergePolicy::default()
                .with_vad_threshold(self.vad_threshold)
                .with_min_silence_ms(self.min_silence_ms)
                .with_max_segment_ms(self.max_segment_ms),
            frame_ms: self.frame_ms,
            parallel_threshold_search: self.parallel_search,
            worker_count: workers,
            adaptive_search: self.adaptive,
            ..EngineConfig::default()
        }
    }

    fn model(&self) -> anyhow::Result<Option<ModelHandle>> {
        if !self.vad {
            return Ok(None);
        }
        let model = SileroVad::new(16_000).context("failed to initialise the Silero VAD model")?;
        Ok(Some(ModelHandle::new(model)))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tacet=info,tacet_core=info".parse().unwrap()),
        )
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Process {
            input,
            output_dir,
            opts,
        } => {
            if !input.is_file() {
                bail!("input is not a file: {}", input.display());
            }
            let coordinator = Coordinator::new(opts.engine_config(), opts.model()?)?;
            let output = output_path(&input, output_dir.as_deref())?;

            match coordinator.process_file(&input, &output) {
                Ok(result) => {
                    if opts.json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        println!(
                            "{} ({} -> {} bytes, kept {:.1}%)",
                            result.output_path.display(),
                            result.original_size_bytes,
                            result.output_size_bytes,
                            result.stats.keep_ratio * 100.0
                        );
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    error!(input = %input.display(), "processing failed: {err}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Command::Batch {
            input_dir,
            output_dir,
            opts,
        } => {
            if !input_dir.is_dir() {
                bail!("input is not a directory: {}", input_dir.display());
            }

            let mut files = Vec::new();
            collect_audio_files(&input_dir, &mut files)?;
            files.sort();
            if files.is_empty() {
                bail!("no audio files found in {}", input_dir.display());
            }
            info!(files = files.len(), "found audio files");

            if let Some(dir) = &output_dir {
                fs::create_dir_all(dir)
                    .with_context(|| format!("cannot create output directory {}", dir.display()))?;
            }

            let jobs: Vec<BatchJob> = files
                .iter()
                .map(|input| {
                    Ok(BatchJob {
                        output: output_path(input, output_dir.as_deref())?,
                        input: input.clone(),
                    })
                })
                .collect::<anyhow::Result<_>>()?;

            let coordinator = Coordinator::new(opts.engine_config(), opts.model()?)?;
            let report = BatchOrchestrator::new(&coordinator).run(&jobs);

            if opts.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for outcome in &report.outcomes {
                    match outcome {
                        FileOutcome::Success { input, result } => println!(
                            "ok     {} -> {} (kept {:.1}%)",
                            input.display(),
                            result.output_path.display(),
                            result.stats.keep_ratio * 100.0
                        ),
                        FileOutcome::Failure {
                            input,
                            kind,
                            message,
                        } => println!("failed {} [{kind:?}] {message}", input.display()),
                    }
                }
                println!(
                    "done: {}/{} succeeded, {} failed",
                    report.summary.succeeded, report.summary.total_files, report.summary.failed
                );
            }

            if report.summary.succeeded > 0 {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// `<stem>-desilenced.<ext>` next to the input, or inside `output_dir`.
fn output_path(input: &Path, output_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("cannot derive a file name from {}", input.display()))?;
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("wav");
    let file_name = format!("{stem}{OUTPUT_SUFFIX}.{ext}");

    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };
    Ok(dir.join(file_name))
}

/// Recursively collect files with a known audio extension.
fn collect_audio_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_audio_files(&path, out)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                out.push(path);
            }
        }
    }
    Ok(())
}
