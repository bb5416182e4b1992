//! Command-line interface.
//!
//! Provides commands for running the CSV-to-deck pipeline and inspecting
//! the resolved configuration. Options come from a YAML file, with
//! individual flags layered on top.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use crate::config::{ImageMode, PipelineOptions, SourceColumn};
use crate::core::{run_pipeline, CancelReason, CancelSignal, RunStatus};
use crate::domain::{LogLevel, ProgressEvent, ProgressSink};

/// deckforge - CSV to Anki deck pipeline
#[derive(Parser, Debug)]
#[command(name = "deckforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline on a CSV file
    Run {
        /// Options YAML file (flags below override its fields)
        #[arg(short, long)]
        options: Option<PathBuf>,

        /// Input CSV path
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Deck name shown in Anki
        #[arg(short, long)]
        deck_name: Option<String>,

        /// Output .apkg path
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,

        /// Image sourcing strategy
        #[arg(long, value_enum)]
        image_mode: Option<ImageModeArg>,

        /// Style hint for generation prompts, e.g. "comic"
        #[arg(long)]
        gen_style: Option<String>,

        /// Which column feeds TTS
        #[arg(long, value_enum)]
        tts_from: Option<ColumnArg>,

        /// Which column feeds image acquisition
        #[arg(long, value_enum)]
        images_from: Option<ColumnArg>,

        /// Maximum rows processed concurrently
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Rows per output archive
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// CSV delimiter (auto-detected if omitted)
        #[arg(long)]
        delimiter: Option<char>,

        /// Ignore per-row image cache folders from earlier runs
        #[arg(long)]
        no_cache: bool,

        /// Validate input and report progress without side effects
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the resolved configuration
    Config {
        /// Options YAML file
        #[arg(short, long)]
        options: Option<PathBuf>,
    },
}

/// Image mode for CLI (maps to ImageMode)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ImageModeArg {
    /// Provider-chain web search
    Search,
    /// Generative renderer with search fallback
    Generate,
}

impl From<ImageModeArg> for ImageMode {
    fn from(m: ImageModeArg) -> Self {
        match m {
            ImageModeArg::Search => ImageMode::Search,
            ImageModeArg::Generate => ImageMode::Generate,
        }
    }
}

/// Column selector for CLI (maps to SourceColumn)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColumnArg {
    Front,
    Back,
}

impl From<ColumnArg> for SourceColumn {
    fn from(c: ColumnArg) -> Self {
        match c {
            ColumnArg::Front => SourceColumn::Front,
            ColumnArg::Back => SourceColumn::Back,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                options,
                input,
                deck_name,
                output,
                image_mode,
                gen_style,
                tts_from,
                images_from,
                concurrency,
                batch_size,
                delimiter,
                no_cache,
                dry_run,
            } => {
                let mut opts = load_options(options, input.as_deref(), deck_name.as_deref())?;
                if let Some(input) = input {
                    opts.input = input;
                }
                if let Some(deck_name) = deck_name {
                    opts.deck_name = deck_name;
                }
                if let Some(output) = output {
                    opts.output = output;
                }
                if let Some(mode) = image_mode {
                    opts.image_mode = mode.into();
                }
                if let Some(style) = gen_style {
                    opts.gen_style = Some(style);
                }
                if let Some(col) = tts_from {
                    opts.tts_from = col.into();
                }
                if let Some(col) = images_from {
                    opts.images_from = col.into();
                }
                if let Some(concurrency) = concurrency {
                    opts.concurrency = concurrency;
                }
                if let Some(batch_size) = batch_size {
                    opts.batch_size = batch_size;
                }
                if let Some(delimiter) = delimiter {
                    opts.csv_delimiter = Some(delimiter);
                }
                if no_cache {
                    opts.use_image_cache = false;
                }
                if dry_run {
                    opts.dry_run = true;
                }

                execute_run(opts).await
            }
            Commands::Config { options } => {
                let opts = load_options(options, None, None)?;
                let yaml =
                    serde_yaml::to_string(&opts).context("Failed to render options YAML")?;
                println!("{yaml}");
                Ok(())
            }
        }
    }
}

/// Load the options file if given, otherwise start from defaults. When no
/// file is given, input and deck name must come from flags.
fn load_options(
    options_file: Option<PathBuf>,
    input: Option<&std::path::Path>,
    deck_name: Option<&str>,
) -> Result<PipelineOptions> {
    match options_file {
        Some(path) => PipelineOptions::from_file(&path),
        None => {
            let input = input.ok_or_else(|| {
                anyhow::anyhow!("No input provided. Use --options <file> or --input <csv>")
            })?;
            let deck_name = deck_name.unwrap_or("Deck");
            Ok(PipelineOptions::new(input, deck_name))
        }
    }
}

/// Run with ctrl-c wired to cancellation.
async fn execute_run(opts: PipelineOptions) -> Result<()> {
    let cancel = CancelSignal::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, stopping run...");
            ctrl_c_cancel.cancel(CancelReason::User);
        }
    });

    let dry_run = opts.dry_run;
    let report = run_pipeline(opts, std::sync::Arc::new(ConsoleSink), cancel).await?;

    match report.status {
        RunStatus::Completed => {
            let c = report.counters;
            eprintln!(
                "\n[Done: {} ok, {} failed, {} retries in {}ms]",
                c.done, c.failed, c.retries, report.duration_ms
            );
            for output in &report.outputs {
                println!("{}", output.display());
            }
            if !dry_run && report.outputs.is_empty() {
                anyhow::bail!("Run produced no output files");
            }
            Ok(())
        }
        RunStatus::Cancelled | RunStatus::Superseded => {
            eprintln!("\n[Run cancelled]");
            std::process::exit(130);
        }
    }
}

/// Sink that renders events to stderr as human-readable lines.
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Preflight { message } => eprintln!("{message}"),
            ProgressEvent::Progress(c) => {
                eprintln!(
                    "progress: {} queued, {} running, {} done, {} failed, {} retries",
                    c.queued, c.running, c.done, c.failed, c.retries
                );
            }
            ProgressEvent::Log { level, message } => match level {
                LogLevel::Info => eprintln!("{message}"),
                LogLevel::Warn | LogLevel::Error => warn!("{message}"),
            },
            ProgressEvent::PackStart {
                total,
                parts,
                batch_size,
            } => {
                eprintln!("packing {total} row(s) into {parts} part(s) (batch size {batch_size})");
            }
            ProgressEvent::PackPart {
                part_index,
                parts,
                filename,
            } => {
                eprintln!("  part {}/{}: {}", part_index + 1, parts, filename.display());
            }
            ProgressEvent::PackDone {
                outputs,
                duration_ms,
            } => {
                eprintln!("packed {} file(s) in {duration_ms}ms", outputs.len());
            }
        }
    }
}
