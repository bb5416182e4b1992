//! Run driver: wire the collaborators together, run the scheduler, then
//! package.
//!
//! A run is a pure function of its options apart from the filesystem and
//! network effects; the coordinator on top adds the "one active run,
//! newest wins" policy for embedding callers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

use super::packager;
use super::scheduler::{self, CancelReason, CancelSignal, UnitContext};
use crate::config::{ImageMode, PipelineOptions};
use crate::domain::{ProgressCounters, ProgressEvent, ProgressSink, ProgressTracker};
use crate::error::RunError;
use crate::images::generate::{GeneratorConfig, PollinationsGenerator};
use crate::images::search::{SearchConfig, SearchFetcher};
use crate::ingest::csv;
use crate::tts::edge::EdgeSynthesizer;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Superseded,
}

/// Final account of a run: what was produced and what the counters said.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub outputs: Vec<std::path::PathBuf>,
    pub counters: ProgressCounters,
    pub duration_ms: u64,
}

/// Serializes runs for long-lived callers: starting a new run cancels the
/// previous one as superseded.
#[derive(Default)]
pub struct RunCoordinator {
    current: Mutex<Option<CancelSignal>>,
}

impl RunCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the cancel signal for a new run, superseding any run that
    /// is still holding the slot.
    pub fn begin(&self) -> CancelSignal {
        let mut slot = self.current.lock().expect("coordinator lock");
        if let Some(previous) = slot.take() {
            previous.cancel(CancelReason::Superseded);
        }
        let signal = CancelSignal::new();
        *slot = Some(signal.clone());
        signal
    }
}

fn build_context(opts: PipelineOptions) -> Arc<UnitContext> {
    let request_timeout = Duration::from_millis(opts.request_timeout_ms);

    let synthesizer = Arc::new(EdgeSynthesizer::new(
        opts.tts_endpoint.clone(),
        request_timeout,
    ));

    let mut gen_config = GeneratorConfig::new(opts.images_dir.clone());
    gen_config.style = opts.gen_style.clone();
    gen_config.width = opts.gen_width;
    gen_config.height = opts.gen_height;
    gen_config.request_timeout = request_timeout;
    gen_config.retries = opts.gen_retries;
    gen_config.polls = opts.gen_polls;
    gen_config.poll_backoff.initial_delay_ms = opts.gen_poll_delay_ms;
    gen_config.warmup_min_bytes = opts.warmup_min_bytes;
    let generator = Arc::new(PollinationsGenerator::new(gen_config));

    let mut search_config = SearchConfig::new(opts.images_dir.clone());
    search_config.max_per_provider = opts.max_per_provider;
    search_config.min_download_bytes = opts.min_download_bytes;
    search_config.request_timeout = request_timeout;
    let searcher = Arc::new(SearchFetcher::new(search_config));

    Arc::new(UnitContext {
        opts,
        synthesizer,
        generator,
        searcher,
    })
}

/// Run the full pipeline with the default collaborators built from the
/// options.
pub async fn run_pipeline(
    opts: PipelineOptions,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelSignal,
) -> Result<RunReport, RunError> {
    run_pipeline_with(build_context(opts), sink, cancel).await
}

/// Run the pipeline with caller-provided collaborators. This is the whole
/// run: ingest, schedule, package.
pub async fn run_pipeline_with(
    ctx: Arc<UnitContext>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelSignal,
) -> Result<RunReport, RunError> {
    let started = Instant::now();
    let opts = ctx.opts.clone();

    sink.emit(ProgressEvent::Preflight {
        message: format!("Reading {}", opts.input.display()),
    });

    if !opts.dry_run {
        for dir in [&opts.media_dir, &opts.images_dir] {
            std::fs::create_dir_all(dir).map_err(|source| RunError::Workspace {
                path: dir.clone(),
                source,
            })?;
        }
    }

    let rows = csv::read_rows(&opts.input, opts.csv_delimiter)?;
    let units = csv::rows_to_work(&rows, &opts.col_front, &opts.col_back)?;

    let mode = match opts.image_mode {
        ImageMode::Search => "search",
        ImageMode::Generate => "generate",
    };
    sink.emit(ProgressEvent::Preflight {
        message: format!(
            "{} row(s), images: {mode}, concurrency {}{}",
            units.len(),
            opts.concurrency.max(1),
            if opts.dry_run { " (dry run)" } else { "" }
        ),
    });
    info!(rows = units.len(), mode, dry_run = opts.dry_run, "Run starting");

    let tracker = Arc::new(ProgressTracker::new(units.len(), Arc::clone(&sink)));
    let settled = scheduler::run_units(
        Arc::clone(&ctx),
        Arc::clone(&tracker),
        units,
        cancel.clone(),
    )
    .await;

    if cancel.is_cancelled() {
        let status = match cancel.reason() {
            Some(CancelReason::Superseded) => RunStatus::Superseded,
            _ => RunStatus::Cancelled,
        };
        info!(?status, "Run stopped before packaging");
        return Ok(RunReport {
            status,
            outputs: Vec::new(),
            counters: tracker.counters(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    // Dry runs have no media files backing the recorded names, so there
    // is nothing real to package.
    let outputs = if opts.dry_run {
        sink.emit(ProgressEvent::PackStart {
            total: settled.len(),
            parts: 0,
            batch_size: opts.batch_size.max(1),
        });
        Vec::new()
    } else {
        packager::pack(&settled, &opts, sink.as_ref())?
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    sink.emit(ProgressEvent::PackDone {
        outputs: outputs.clone(),
        duration_ms,
    });

    let counters = tracker.counters();
    info!(
        done = counters.done,
        failed = counters.failed,
        outputs = outputs.len(),
        duration_ms,
        "Run finished"
    );
    Ok(RunReport {
        status: RunStatus::Completed,
        outputs,
        counters,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_supersedes_previous_run() {
        let coordinator = RunCoordinator::new();
        let first = coordinator.begin();
        assert!(!first.is_cancelled());

        let second = coordinator.begin();
        assert!(first.is_cancelled());
        assert_eq!(first.reason(), Some(CancelReason::Superseded));
        assert!(!second.is_cancelled());
    }
}
