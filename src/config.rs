//! Pipeline configuration.
//!
//! Options can be loaded from a YAML file and overridden from the CLI.
//! Every field has a serde default so a minimal file (just `input` and
//! `deck_name`) is enough to run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which column feeds a derived artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceColumn {
    Front,
    Back,
}

impl Default for SourceColumn {
    fn default() -> Self {
        Self::Back
    }
}

/// Image sourcing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMode {
    /// Provider-chain web search.
    Search,
    /// Generative renderer with search fallback.
    Generate,
}

impl Default for ImageMode {
    fn default() -> Self {
        Self::Search
    }
}

/// Voice parameters forwarded to the speech synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSpec {
    /// Voice name, e.g. "de-DE-KatjaNeural".
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Rate adjustment, e.g. "+10%".
    #[serde(default)]
    pub rate: Option<String>,

    /// Pitch adjustment, e.g. "+2Hz".
    #[serde(default)]
    pub pitch: Option<String>,

    /// Volume adjustment, e.g. "+0%".
    #[serde(default)]
    pub volume: Option<String>,
}

impl Default for VoiceSpec {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            rate: None,
            pitch: None,
            volume: None,
        }
    }
}

fn default_voice() -> String {
    "de-DE-KatjaNeural".to_string()
}

/// All recognized pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Input CSV path.
    pub input: PathBuf,

    /// Deck name shown in Anki.
    pub deck_name: String,

    /// Output .apkg path (batching may insert .partN before the extension).
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Directory for media attachments referenced by cards.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Directory for per-row image cache folders.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// Voice parameters for speech synthesis.
    #[serde(default)]
    pub voice: VoiceSpec,

    /// Speech synthesis HTTP endpoint.
    #[serde(default = "default_tts_endpoint")]
    pub tts_endpoint: String,

    /// Immediate retries when synthesis fails (default: 2).
    #[serde(default = "default_tts_retries")]
    pub tts_retries: u32,

    /// Images to attach per note (default: 1).
    #[serde(default = "default_images_per_note")]
    pub images_per_note: usize,

    /// Maximum units processed concurrently (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// CSV column holding the front text (default: "front").
    #[serde(default = "default_col_front")]
    pub col_front: String,

    /// CSV column holding the back text (default: "back").
    #[serde(default = "default_col_back")]
    pub col_back: String,

    /// Which column feeds TTS (default: back).
    #[serde(default)]
    pub tts_from: SourceColumn,

    /// Which column feeds image acquisition (default: back).
    #[serde(default)]
    pub images_from: SourceColumn,

    /// Image sourcing strategy (default: search).
    #[serde(default)]
    pub image_mode: ImageMode,

    /// Style hint appended to generation prompts, e.g. "comic".
    #[serde(default)]
    pub gen_style: Option<String>,

    /// Reuse per-row cache folders from earlier runs (default: true).
    #[serde(default = "default_true")]
    pub use_image_cache: bool,

    /// Rows per output archive (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// CSV delimiter override; None = auto-detect from the header line.
    #[serde(default)]
    pub csv_delimiter: Option<char>,

    /// Validate input and report progress without network or file effects.
    #[serde(default)]
    pub dry_run: bool,

    /// Generated image width (default: 768).
    #[serde(default = "default_gen_width")]
    pub gen_width: u32,

    /// Generated image height (default: 512).
    #[serde(default = "default_gen_height")]
    pub gen_height: u32,

    /// Per-request timeout for image fetches, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Full-restart retries per generated image (default: 2).
    #[serde(default = "default_gen_retries")]
    pub gen_retries: u32,

    /// Warm-up polls per generation attempt (default: 4).
    #[serde(default = "default_gen_polls")]
    pub gen_polls: u32,

    /// Initial warm-up poll delay, in milliseconds (default: 750).
    #[serde(default = "default_gen_poll_delay_ms")]
    pub gen_poll_delay_ms: u64,

    /// Bodies smaller than this are treated as warm-up placeholders.
    /// Tuned against one renderer; configurable, not sacred.
    #[serde(default = "default_warmup_min_bytes")]
    pub warmup_min_bytes: usize,

    /// Minimum acceptable size for a downloaded search image.
    #[serde(default = "default_min_download_bytes")]
    pub min_download_bytes: usize,

    /// Candidate URLs requested per search provider (default: 12).
    #[serde(default = "default_max_per_provider")]
    pub max_per_provider: usize,
}

fn default_output() -> PathBuf {
    PathBuf::from("deck.apkg")
}
fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}
fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}
fn default_tts_endpoint() -> String {
    "http://127.0.0.1:5002/api/tts".to_string()
}
fn default_tts_retries() -> u32 {
    2
}
fn default_images_per_note() -> usize {
    1
}
fn default_concurrency() -> usize {
    4
}
fn default_col_front() -> String {
    "front".to_string()
}
fn default_col_back() -> String {
    "back".to_string()
}
fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    500
}
fn default_gen_width() -> u32 {
    768
}
fn default_gen_height() -> u32 {
    512
}
fn default_request_timeout_ms() -> u64 {
    20_000
}
fn default_gen_retries() -> u32 {
    2
}
fn default_gen_polls() -> u32 {
    4
}
fn default_gen_poll_delay_ms() -> u64 {
    750
}
fn default_warmup_min_bytes() -> usize {
    20_000
}
fn default_min_download_bytes() -> usize {
    4096
}
fn default_max_per_provider() -> usize {
    12
}

impl PipelineOptions {
    /// Load options from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse options from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse options YAML")
    }

    /// Minimal options for a given input and deck name, defaults elsewhere.
    pub fn new(input: impl Into<PathBuf>, deck_name: impl Into<String>) -> Self {
        let mut opts: Self =
            serde_yaml::from_str("input: \"-\"\ndeck_name: \"-\"").expect("defaults parse");
        opts.input = input.into();
        opts.deck_name = deck_name.into();
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let opts = PipelineOptions::from_yaml("input: words.csv\ndeck_name: German A1").unwrap();
        assert_eq!(opts.concurrency, 4);
        assert_eq!(opts.images_per_note, 1);
        assert_eq!(opts.tts_retries, 2);
        assert_eq!(opts.image_mode, ImageMode::Search);
        assert_eq!(opts.tts_from, SourceColumn::Back);
        assert!(opts.use_image_cache);
        assert_eq!(opts.warmup_min_bytes, 20_000);
        assert_eq!(opts.min_download_bytes, 4096);
    }

    #[test]
    fn test_mode_and_columns_parse() {
        let yaml = r#"
input: words.csv
deck_name: Verbs
image_mode: generate
tts_from: front
gen_style: comic
csv_delimiter: ";"
"#;
        let opts = PipelineOptions::from_yaml(yaml).unwrap();
        assert_eq!(opts.image_mode, ImageMode::Generate);
        assert_eq!(opts.tts_from, SourceColumn::Front);
        assert_eq!(opts.gen_style.as_deref(), Some("comic"));
        assert_eq!(opts.csv_delimiter, Some(';'));
    }
}
