//! Text-to-speech adapter.
//!
//! The synthesizer is a trait so the scheduler can run against a mock in
//! tests. The real implementation streams MP3 audio from an HTTP speech
//! endpoint; retry policy lives in the scheduler, not here.

pub mod edge;

use async_trait::async_trait;
use thiserror::Error;

pub use edge::EdgeSynthesizer;

use crate::config::VoiceSpec;

/// Errors from one synthesis attempt.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("No audio received from speech endpoint")]
    NoAudioReceived,

    #[error("Speech endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Speech request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One-shot speech synthesis: text + voice parameters to audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Synthesize `text` and return the complete audio artifact.
    async fn synthesize(&self, text: &str, voice: &VoiceSpec) -> Result<Vec<u8>, TtsError>;
}
