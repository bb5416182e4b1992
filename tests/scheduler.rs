//! Scheduler behavior: concurrency limits, cache shortfall math, and TTS
//! retry handling, all against in-memory fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use deckforge::config::ImageMode;
use deckforge::core::{run_units, CancelSignal, UnitContext};
use deckforge::domain::{LogLevel, ProgressEvent, ProgressTracker, Row, UnitState, WorkUnit};

use common::{BrokenSynth, FakeAcquirer, FakeSynth, RecordingSink};

fn units(n: usize) -> Vec<WorkUnit> {
    (1..=n)
        .map(|i| {
            WorkUnit::new(Row {
                index: i,
                front: format!("word {i}"),
                back: format!("Satz nummer {i}"),
            })
        })
        .collect()
}

struct Fixture {
    root: tempfile::TempDir,
    ctx: Arc<UnitContext>,
    searcher: Arc<FakeAcquirer>,
}

fn fixture(configure: impl FnOnce(&mut deckforge::PipelineOptions)) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let input = common::write_csv(root.path(), 1);
    let mut opts = common::test_options(root.path(), &input);
    configure(&mut opts);
    std::fs::create_dir_all(&opts.media_dir).unwrap();
    std::fs::create_dir_all(&opts.images_dir).unwrap();

    let searcher = Arc::new(FakeAcquirer::new("search", &opts.images_dir));
    let generator = Arc::new(FakeAcquirer::barren("gen", &opts.images_dir));
    let ctx = Arc::new(UnitContext {
        opts,
        synthesizer: Arc::new(FakeSynth::ok()),
        generator,
        searcher: searcher.clone(),
    });
    Fixture {
        root,
        ctx,
        searcher,
    }
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let root = tempfile::tempdir().unwrap();
    let input = common::write_csv(root.path(), 1);
    let mut opts = common::test_options(root.path(), &input);
    opts.concurrency = 1;
    std::fs::create_dir_all(&opts.media_dir).unwrap();

    let ctx = Arc::new(UnitContext {
        opts: opts.clone(),
        synthesizer: Arc::new(FakeSynth::slow(Duration::from_millis(10))),
        generator: Arc::new(FakeAcquirer::barren("gen", &opts.images_dir)),
        searcher: Arc::new(FakeAcquirer::barren("search", &opts.images_dir)),
    });

    let sink = Arc::new(RecordingSink::new());
    let tracker = Arc::new(ProgressTracker::new(4, sink.clone()));
    let settled = run_units(ctx, tracker, units(4), CancelSignal::new()).await;

    assert_eq!(settled.len(), 4);
    assert!(settled.iter().all(|u| u.state == UnitState::Done));
    for event in sink.events() {
        if let ProgressEvent::Progress(c) = event {
            assert!(c.running <= 1, "running exceeded limit: {}", c.running);
            assert_eq!(c.queued + c.running + c.done + c.failed, 4);
        }
    }
}

#[tokio::test]
async fn test_results_come_back_in_row_order() {
    let fx = fixture(|opts| opts.concurrency = 8);
    let tracker = Arc::new(ProgressTracker::new(6, Arc::new(RecordingSink::new())));
    let settled = run_units(fx.ctx.clone(), tracker, units(6), CancelSignal::new()).await;

    let indices: Vec<usize> = settled.iter().map(|u| u.row.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);
    drop(fx.root);
}

#[tokio::test]
async fn test_cache_hit_fills_shortfall_only() {
    let fx = fixture(|opts| opts.images_per_note = 3);

    // Two cached images for row 1 under the searcher's cache key.
    let cache_folder = fx.ctx.opts.images_dir.join("001-search");
    std::fs::create_dir_all(&cache_folder).unwrap();
    std::fs::write(cache_folder.join("000001.jpg"), b"cached-one").unwrap();
    std::fs::write(cache_folder.join("000002.jpg"), b"cached-two").unwrap();

    let tracker = Arc::new(ProgressTracker::new(1, Arc::new(RecordingSink::new())));
    let settled = run_units(fx.ctx.clone(), tracker, units(1), CancelSignal::new()).await;

    // The acquirer is only asked for the single missing image.
    assert_eq!(fx.searcher.call_log(), vec![(1, 1)]);
    assert_eq!(settled[0].state, UnitState::Done);
    assert_eq!(settled[0].image_names.len(), 1);
    drop(fx.root);
}

#[tokio::test]
async fn test_cache_bypass_clears_folders_and_refetches() {
    let fx = fixture(|opts| {
        opts.use_image_cache = false;
        opts.images_per_note = 1;
    });

    let stale_folder = fx.ctx.opts.images_dir.join("001-search");
    std::fs::create_dir_all(&stale_folder).unwrap();
    std::fs::write(stale_folder.join("000001.jpg"), b"stale").unwrap();

    let tracker = Arc::new(ProgressTracker::new(1, Arc::new(RecordingSink::new())));
    run_units(fx.ctx.clone(), tracker, units(1), CancelSignal::new()).await;

    // Full request goes to the acquirer; the stale file is gone.
    assert_eq!(fx.searcher.call_log(), vec![(1, 1)]);
    assert!(!stale_folder.join("000001.jpg").exists() || {
        // Acquirer recreated the folder; the stale bytes must not survive.
        std::fs::read(stale_folder.join("000001.jpg")).unwrap() != b"stale"
    });
    drop(fx.root);
}

#[tokio::test]
async fn test_provider_error_is_nonfatal_and_warns() {
    let root = tempfile::tempdir().unwrap();
    let input = common::write_csv(root.path(), 1);
    let opts = common::test_options(root.path(), &input);
    std::fs::create_dir_all(&opts.media_dir).unwrap();

    let searcher = Arc::new(FakeAcquirer::erroring("search", &opts.images_dir));
    let ctx = Arc::new(UnitContext {
        opts: opts.clone(),
        synthesizer: Arc::new(FakeSynth::ok()),
        generator: Arc::new(FakeAcquirer::barren("gen", &opts.images_dir)),
        searcher: searcher.clone(),
    });

    let sink = Arc::new(RecordingSink::new());
    let tracker = Arc::new(ProgressTracker::new(1, sink.clone()));
    let settled = run_units(ctx, tracker.clone(), units(1), CancelSignal::new()).await;

    // The timed-out provider shrinks the result to nothing; the row
    // still settles cleanly, with audio but no image.
    assert_eq!(searcher.call_log(), vec![(1, 1)]);
    assert_eq!(settled[0].state, UnitState::Done);
    assert!(settled[0].image_names.is_empty());
    assert!(settled[0].mp3_name.is_some());
    assert_eq!(tracker.counters().failed, 0);

    let warned = sink.events().iter().any(|e| {
        matches!(e, ProgressEvent::Log { level: LogLevel::Warn, message }
            if message.contains("search error"))
    });
    assert!(warned, "expected a warning log for the provider error");
}

#[tokio::test]
async fn test_generator_error_falls_back_to_search() {
    let root = tempfile::tempdir().unwrap();
    let input = common::write_csv(root.path(), 1);
    let mut opts = common::test_options(root.path(), &input);
    opts.image_mode = ImageMode::Generate;
    std::fs::create_dir_all(&opts.media_dir).unwrap();

    let generator = Arc::new(FakeAcquirer::erroring("gen", &opts.images_dir));
    let searcher = Arc::new(FakeAcquirer::new("search", &opts.images_dir));
    let ctx = Arc::new(UnitContext {
        opts: opts.clone(),
        synthesizer: Arc::new(FakeSynth::ok()),
        generator: generator.clone(),
        searcher: searcher.clone(),
    });

    let tracker = Arc::new(ProgressTracker::new(1, Arc::new(RecordingSink::new())));
    let settled = run_units(ctx, tracker, units(1), CancelSignal::new()).await;

    // The generator's failure hands the whole request to search.
    assert_eq!(generator.call_log(), vec![(1, 1)]);
    assert_eq!(searcher.call_log(), vec![(1, 1)]);
    assert_eq!(settled[0].state, UnitState::Done);
    assert_eq!(settled[0].image_names.len(), 1);
}

#[tokio::test]
async fn test_concurrency_level_does_not_change_results() {
    async fn run_with_concurrency(concurrency: usize) -> Vec<(usize, Option<String>, Vec<String>)> {
        let root = tempfile::tempdir().unwrap();
        let input = common::write_csv(root.path(), 1);
        let mut opts = common::test_options(root.path(), &input);
        opts.concurrency = concurrency;
        std::fs::create_dir_all(&opts.media_dir).unwrap();

        let ctx = Arc::new(UnitContext {
            opts: opts.clone(),
            synthesizer: Arc::new(FakeSynth::ok()),
            generator: Arc::new(FakeAcquirer::barren("gen", &opts.images_dir)),
            searcher: Arc::new(FakeAcquirer::new("search", &opts.images_dir)),
        });
        let tracker = Arc::new(ProgressTracker::new(4, Arc::new(RecordingSink::new())));
        let settled = run_units(ctx, tracker, units(4), CancelSignal::new()).await;
        settled
            .into_iter()
            .map(|u| (u.row.index, u.mp3_name, u.image_names))
            .collect()
    }

    // Filenames are pure functions of index and text, so the packaged
    // content is the same whatever the parallelism.
    let serial = run_with_concurrency(1).await;
    let parallel = run_with_concurrency(4).await;
    assert_eq!(serial, parallel);
}

#[tokio::test]
async fn test_tts_exhaustion_degrades_row_without_failing_it() {
    let root = tempfile::tempdir().unwrap();
    let input = common::write_csv(root.path(), 1);
    let mut opts = common::test_options(root.path(), &input);
    opts.tts_retries = 1;
    std::fs::create_dir_all(&opts.media_dir).unwrap();

    let ctx = Arc::new(UnitContext {
        opts: opts.clone(),
        synthesizer: Arc::new(BrokenSynth),
        generator: Arc::new(FakeAcquirer::barren("gen", &opts.images_dir)),
        searcher: Arc::new(FakeAcquirer::new("search", &opts.images_dir)),
    });

    let tracker = Arc::new(ProgressTracker::new(1, Arc::new(RecordingSink::new())));
    let settled = run_units(ctx, tracker.clone(), units(1), CancelSignal::new()).await;

    assert_eq!(settled[0].state, UnitState::Done);
    assert!(settled[0].mp3_name.is_none());
    // The image pipeline still ran for the degraded row.
    assert_eq!(settled[0].image_names.len(), 1);

    let c = tracker.counters();
    assert_eq!(c.done, 1);
    assert_eq!(c.failed, 0);
    assert_eq!(c.retries, 1);
}

#[tokio::test]
async fn test_tts_retry_then_success_writes_audio() {
    let root = tempfile::tempdir().unwrap();
    let input = common::write_csv(root.path(), 1);
    let mut opts = common::test_options(root.path(), &input);
    opts.tts_retries = 2;
    std::fs::create_dir_all(&opts.media_dir).unwrap();

    let synth = Arc::new(FakeSynth::failing(1));
    let ctx = Arc::new(UnitContext {
        opts: opts.clone(),
        synthesizer: synth.clone(),
        generator: Arc::new(FakeAcquirer::barren("gen", &opts.images_dir)),
        searcher: Arc::new(FakeAcquirer::new("search", &opts.images_dir)),
    });

    let tracker = Arc::new(ProgressTracker::new(1, Arc::new(RecordingSink::new())));
    let settled = run_units(ctx, tracker.clone(), units(1), CancelSignal::new()).await;

    assert_eq!(synth.attempts(), 2);
    assert_eq!(tracker.counters().retries, 1);
    let mp3 = settled[0].mp3_name.as_ref().unwrap();
    assert!(opts.media_dir.join(mp3).exists());
}
