//! HTTP speech synthesis client.
//!
//! Talks to an edge-tts compatible HTTP bridge: a GET with text and voice
//! parameters, answered with a chunked MP3 body. An empty body counts as
//! `NoAudioReceived` so the caller can tell "the service answered but had
//! nothing to say" apart from transport failures.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{SpeechSynthesizer, TtsError};
use crate::config::VoiceSpec;

pub struct EdgeSynthesizer {
    endpoint: String,
    client: reqwest::Client,
}

impl EdgeSynthesizer {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { endpoint, client }
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeSynthesizer {
    fn name(&self) -> &str {
        "edge-tts"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceSpec) -> Result<Vec<u8>, TtsError> {
        let mut params: Vec<(&str, &str)> = vec![("text", text), ("voice", &voice.voice)];
        if let Some(rate) = voice.rate.as_deref() {
            params.push(("rate", rate));
        }
        if let Some(pitch) = voice.pitch.as_deref() {
            params.push(("pitch", pitch));
        }
        if let Some(volume) = voice.volume.as_deref() {
            params.push(("volume", volume));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TtsError::Status(status.as_u16()));
        }

        // Collect the chunked body; zero audio chunks is a synthesis
        // failure, not a success with empty output.
        let mut audio = Vec::new();
        let mut response = response;
        while let Some(chunk) = response.chunk().await? {
            audio.extend_from_slice(&chunk);
        }

        if audio.is_empty() {
            return Err(TtsError::NoAudioReceived);
        }

        debug!(bytes = audio.len(), voice = %voice.voice, "Synthesized audio");
        Ok(audio)
    }
}
