//! Shared fakes for integration tests: an in-memory synthesizer, a
//! file-producing image acquirer, and an event-recording sink.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use deckforge::config::{PipelineOptions, VoiceSpec};
use deckforge::domain::{ImageResult, ImageSource, ProgressEvent, ProgressSink};
use deckforge::images::ImageAcquirer;
use deckforge::tts::{SpeechSynthesizer, TtsError};

/// Synthesizer that fails a fixed number of times, then succeeds, with an
/// optional per-call delay.
pub struct FakeSynth {
    pub failures_before_success: u32,
    pub delay: Duration,
    attempts: AtomicU32,
}

impl FakeSynth {
    pub fn ok() -> Self {
        Self::failing(0)
    }

    pub fn failing(failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            delay: Duration::ZERO,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            failures_before_success: 0,
            delay,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    fn name(&self) -> &str {
        "fake-tts"
    }

    async fn synthesize(&self, _text: &str, _voice: &VoiceSpec) -> Result<Vec<u8>, TtsError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures_before_success {
            return Err(TtsError::NoAudioReceived);
        }
        Ok(b"ID3-fake-mp3-bytes".to_vec())
    }
}

/// Synthesizer that never produces audio.
pub struct BrokenSynth;

#[async_trait]
impl SpeechSynthesizer for BrokenSynth {
    fn name(&self) -> &str {
        "broken-tts"
    }

    async fn synthesize(&self, _text: &str, _voice: &VoiceSpec) -> Result<Vec<u8>, TtsError> {
        Err(TtsError::Status(503))
    }
}

/// Acquirer that writes real files into its cache folder and records every
/// call it receives.
pub struct FakeAcquirer {
    label: &'static str,
    images_dir: PathBuf,
    /// (row index, requested count) per call.
    pub calls: Mutex<Vec<(usize, usize)>>,
    /// How many images each call actually produces, capped by the request.
    pub produce: usize,
    /// Every call fails, as if the provider timed out.
    pub fail: bool,
}

impl FakeAcquirer {
    pub fn new(label: &'static str, images_dir: &Path) -> Self {
        Self {
            label,
            images_dir: images_dir.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            produce: usize::MAX,
            fail: false,
        }
    }

    pub fn barren(label: &'static str, images_dir: &Path) -> Self {
        Self {
            produce: 0,
            ..Self::new(label, images_dir)
        }
    }

    pub fn erroring(label: &'static str, images_dir: &Path) -> Self {
        Self {
            fail: true,
            ..Self::new(label, images_dir)
        }
    }

    pub fn call_log(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageAcquirer for FakeAcquirer {
    fn name(&self) -> &str {
        self.label
    }

    fn cache_key(&self, index: usize, _text: &str) -> String {
        format!("{index:03}-{}", self.label)
    }

    async fn acquire(
        &self,
        index: usize,
        text: &str,
        count: usize,
    ) -> anyhow::Result<Vec<ImageResult>> {
        self.calls.lock().unwrap().push((index, count));
        if self.fail {
            anyhow::bail!("provider timed out");
        }

        let folder = self.images_dir.join(self.cache_key(index, text));
        tokio::fs::create_dir_all(&folder).await?;

        let mut results = Vec::new();
        for seq in 1..=count.min(self.produce) {
            let path = folder.join(format!("{seq:06}.jpg"));
            tokio::fs::write(&path, b"fake-jpeg-bytes").await?;
            results.push(ImageResult {
                path,
                source: ImageSource::Search,
            });
        }
        Ok(results)
    }
}

/// Sink that records every event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Options rooted in a temp dir, tuned for offline tests.
pub fn test_options(root: &Path, input: &Path) -> PipelineOptions {
    let mut opts = PipelineOptions::new(input, "Test Deck");
    opts.output = root.join("deck.apkg");
    opts.media_dir = root.join("media");
    opts.images_dir = root.join("images");
    opts.concurrency = 2;
    opts.tts_retries = 1;
    opts
}

/// Write a front/back CSV with `rows` numbered rows.
pub fn write_csv(root: &Path, rows: usize) -> PathBuf {
    let mut content = String::from("front,back\n");
    for i in 1..=rows {
        content.push_str(&format!("word {i},Satz nummer {i}\n"));
    }
    let path = root.join("input.csv");
    std::fs::write(&path, content).unwrap();
    path
}
