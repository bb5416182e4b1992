//! Rows and work units.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One source record from the input table. Immutable once read; source of
/// truth for all derived text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    /// 1-based position in the input.
    pub index: usize,

    /// Front text (question side).
    pub front: String,

    /// Back text (answer side).
    pub back: String,
}

/// Work unit state machine: `Queued -> Running -> {Done, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Queued,
    Running,
    Done,
    Failed,
}

/// The mutable processing record tracking one row's derived outcomes.
///
/// Created 1:1 per row at pipeline start, mutated only by the task that
/// owns it, consumed by the packager.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub row: Row,

    /// Synthesized audio filename in the media dir, when TTS succeeded.
    pub mp3_name: Option<String>,

    /// Attached image filenames (names, not paths), in acquisition order.
    pub image_names: Vec<String>,

    pub state: UnitState,
}

impl WorkUnit {
    pub fn new(row: Row) -> Self {
        Self {
            row,
            mp3_name: None,
            image_names: Vec::new(),
            state: UnitState::Queued,
        }
    }

    /// Both text fields empty, nothing to derive.
    pub fn is_empty(&self) -> bool {
        self.row.front.is_empty() && self.row.back.is_empty()
    }
}

/// Which strategy (and cache state) produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Search,
    Generate,
    CacheSearch,
    CacheGenerate,
}

impl ImageSource {
    /// The cache-tagged variant of this source.
    pub fn cached(self) -> Self {
        match self {
            Self::Search | Self::CacheSearch => Self::CacheSearch,
            Self::Generate | Self::CacheGenerate => Self::CacheGenerate,
        }
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Search => "search",
            Self::Generate => "generate",
            Self::CacheSearch => "cache/search",
            Self::CacheGenerate => "cache/generate",
        };
        f.write_str(s)
    }
}

/// A freshly acquired image: absolute path in the cache folder plus
/// provenance. Consumed immediately by the scheduler, which copies the
/// file into the media dir and discards the result.
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub path: PathBuf,
    pub source: ImageSource,
}
