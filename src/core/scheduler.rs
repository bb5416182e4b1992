//! Bounded-concurrency work scheduler.
//!
//! All units for a run are submitted at once; a semaphore bounds how many
//! are running simultaneously. The scheduler is purely admission control —
//! completion order is unspecified and results are re-sorted into row
//! order for the packager. Per-row sub-failures (TTS, providers,
//! downloads) are caught and logged inside the unit; only an unexpected
//! error escaping unit processing marks the unit failed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ImageMode, PipelineOptions, SourceColumn};
use crate::domain::{ImageResult, LogLevel, ProgressTracker, UnitState, WorkUnit};
use crate::images::{cache, ImageAcquirer};
use crate::naming;
use crate::tts::SpeechSynthesizer;

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// User-initiated abort.
    User,
    /// A newer run replaced this one.
    Superseded,
}

/// Cancellation token plus the reason it fired. Cloned into every task;
/// the first `cancel` call wins the reason.
#[derive(Clone)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cancel(&self, reason: CancelReason) {
        let mut slot = self.reason.lock().expect("cancel reason lock");
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.reason.lock().expect("cancel reason lock")
    }
}

/// Everything a unit task needs: options plus the pluggable collaborators.
pub struct UnitContext {
    pub opts: PipelineOptions,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub generator: Arc<dyn ImageAcquirer>,
    pub searcher: Arc<dyn ImageAcquirer>,
}

impl UnitContext {
    fn source_text<'a>(&self, unit: &'a WorkUnit, which: SourceColumn) -> &'a str {
        match which {
            SourceColumn::Front => &unit.row.front,
            SourceColumn::Back => &unit.row.back,
        }
    }
}

/// Run all units under the concurrency limit and return them in row order.
///
/// On cancellation, units not yet admitted stay `Queued` and in-flight
/// units are aborted and marked `Failed`.
pub async fn run_units(
    ctx: Arc<UnitContext>,
    tracker: Arc<ProgressTracker>,
    units: Vec<WorkUnit>,
    cancel: CancelSignal,
) -> Vec<WorkUnit> {
    let permits = ctx.opts.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(permits));
    info!(units = units.len(), concurrency = permits, "Scheduling work units");

    let mut join_set = JoinSet::new();
    for unit in units {
        let ctx = Arc::clone(&ctx);
        let tracker = Arc::clone(&tracker);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        join_set.spawn(async move {
            let mut unit = unit;

            // Admission: wait for a permit unless the run is cancelled
            // first. A never-admitted unit stays queued.
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return unit;
            };

            tracker.admit();
            unit.state = UnitState::Running;

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(anyhow::anyhow!("run cancelled")),
                res = process_unit(&ctx, &tracker, &mut unit) => res,
            };

            match outcome {
                Ok(()) => {
                    unit.state = UnitState::Done;
                    tracker.finish_done();
                }
                Err(e) => {
                    unit.state = UnitState::Failed;
                    warn!(index = unit.row.index, error = %e, "Work unit failed");
                    tracker.log(
                        LogLevel::Warn,
                        format!("Work #{} failed: {e:#}", unit.row.index),
                    );
                    tracker.finish_failed();
                }
            }
            unit
        });
    }

    let mut finished = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(unit) => finished.push(unit),
            Err(e) => error!(error = %e, "Unit task panicked"),
        }
    }
    finished.sort_by_key(|u| u.row.index);
    finished
}

/// Process one unit: TTS then image acquisition, sequentially. Best-effort
/// sub-failures are logged and swallowed; anything returned as `Err` here
/// fails the unit.
async fn process_unit(
    ctx: &UnitContext,
    tracker: &ProgressTracker,
    unit: &mut WorkUnit,
) -> Result<()> {
    if unit.is_empty() {
        return Ok(());
    }
    let opts = &ctx.opts;
    let index = unit.row.index;

    // ---------- TTS ----------
    let tts_text = ctx.source_text(unit, opts.tts_from).to_string();
    if !tts_text.is_empty() {
        let mp3 = naming::build_filename(index, &tts_text, ".mp3");
        let out_path = opts.media_dir.join(&mp3);
        let mut have_audio = true;

        let exists = tokio::fs::try_exists(&out_path).await.unwrap_or(false);
        if !opts.dry_run && !exists {
            have_audio = synthesize_with_retry(ctx, tracker, index, &tts_text, &out_path).await?;
        }
        if have_audio {
            unit.mp3_name = Some(mp3);
        }
    }

    // ---------- Images ----------
    let image_text = ctx.source_text(unit, opts.images_from).to_string();
    let mut found: Vec<ImageResult> = Vec::new();

    if !opts.dry_run && !image_text.is_empty() {
        let using_gen = opts.image_mode == ImageMode::Generate;
        let gen_folder = opts
            .images_dir
            .join(ctx.generator.cache_key(index, &image_text));
        let search_folder = opts
            .images_dir
            .join(ctx.searcher.cache_key(index, &image_text));

        if opts.use_image_cache {
            // Check the cache folder matching the current mode only; a hit
            // short-circuits acquisition for the satisfied portion.
            let (folder, source) = if using_gen {
                (&gen_folder, crate::domain::ImageSource::Generate.cached())
            } else {
                (&search_folder, crate::domain::ImageSource::Search.cached())
            };
            let cached = cache::list_cached(folder, opts.images_per_note).await;
            if !cached.is_empty() {
                tracker.log(
                    LogLevel::Info,
                    format!("[#{index}] cache hit ({}): {} file(s)", source, cached.len()),
                );
                found = cached
                    .into_iter()
                    .map(|path| ImageResult { path, source })
                    .collect();
            }
        } else {
            // Bypass: clear both mode folders so no stale images leak into
            // a forced-fresh run.
            cache::clear_if_stale(&gen_folder).await;
            cache::clear_if_stale(&search_folder).await;
            tracker.log(
                LogLevel::Info,
                format!("[#{index}] cache bypass: cleared note image folders"),
            );
        }

        // Fill only the gap left by the cache.
        let short_by = opts.images_per_note.max(1).saturating_sub(found.len());
        if short_by > 0 {
            if using_gen {
                match ctx.generator.acquire(index, &image_text, short_by).await {
                    Ok(generated) => found.extend(generated),
                    Err(e) => tracker.log(
                        LogLevel::Warn,
                        format!("[#{index}] generation error: {e:#}"),
                    ),
                }
            }

            // Search fills whatever is still short: the whole request in
            // search mode, the generator's shortfall in generate mode.
            let still_short = opts.images_per_note.max(1).saturating_sub(found.len());
            if still_short > 0 {
                if using_gen {
                    tracker.log(
                        LogLevel::Info,
                        format!("[#{index}] search fallback (need {still_short})"),
                    );
                }
                match ctx.searcher.acquire(index, &image_text, still_short).await {
                    Ok(searched) => found.extend(searched),
                    Err(e) => {
                        tracker.log(LogLevel::Warn, format!("[#{index}] search error: {e:#}"))
                    }
                }
            }
        }
    }

    if !opts.dry_run {
        if let Some(first) = found.first() {
            let naming_text = pick_naming_text(&image_text, unit);
            let ext = first
                .path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| ".jpg".to_string());
            let out_name = naming::build_filename(index, &naming_text, &ext);
            let dest = opts.media_dir.join(&out_name);

            if !tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                tokio::fs::copy(&first.path, &dest)
                    .await
                    .with_context(|| format!("copy image into media dir: {}", dest.display()))?;
            }
            unit.image_names.push(out_name.clone());
            tracker.log(
                LogLevel::Info,
                format!("[#{index}] image saved from {} -> {out_name}", first.source),
            );
        } else if !image_text.is_empty() {
            tracker.log(LogLevel::Warn, format!("[#{index}] no image produced"));
        }
    }

    Ok(())
}

/// Bounded-retry TTS wrapper. Returns whether audio was produced; retry
/// exhaustion degrades the row to no-audio rather than failing the unit.
async fn synthesize_with_retry(
    ctx: &UnitContext,
    tracker: &ProgressTracker,
    index: usize,
    tts_text: &str,
    out_path: &PathBuf,
) -> Result<bool> {
    let opts = &ctx.opts;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match ctx.synthesizer.synthesize(tts_text, &opts.voice).await {
            Ok(bytes) => {
                if let Some(parent) = out_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("create media dir {}", parent.display()))?;
                }
                tokio::fs::write(out_path, &bytes)
                    .await
                    .with_context(|| format!("write audio {}", out_path.display()))?;
                return Ok(true);
            }
            Err(e) => {
                if attempt > opts.tts_retries {
                    warn!(index, error = %e, retries = opts.tts_retries, "TTS failed, continuing without audio");
                    tracker.log(
                        LogLevel::Warn,
                        format!(
                            "[#{index}] {} failed after {} retries: {e}",
                            ctx.synthesizer.name(),
                            opts.tts_retries
                        ),
                    );
                    return Ok(false);
                }
                tracker.record_retry();
            }
        }
    }
}

fn pick_naming_text(image_text: &str, unit: &WorkUnit) -> String {
    if !image_text.is_empty() {
        image_text.to_string()
    } else if !unit.row.back.is_empty() {
        unit.row.back.clone()
    } else if !unit.row.front.is_empty() {
        unit.row.front.clone()
    } else {
        unit.row.index.to_string()
    }
}
