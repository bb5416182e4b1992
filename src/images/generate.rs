//! Generative image acquisition against the Pollinations renderer.
//!
//! The renderer computes images on demand; while one is still warming up
//! it answers with a tiny placeholder. We poll the same URL with backoff
//! until the body crosses the size threshold, and restart the whole
//! attempt (including polling) a bounded number of times before giving up
//! on that image. The seed is the row index, so the same row reproduces
//! the same image across reruns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::ImageAcquirer;
use crate::core::retry::RetryPolicy;
use crate::domain::{ImageResult, ImageSource};
use crate::naming;
use crate::text;

const USER_AGENT: &str = "deckforge/0.1 (+https://github.com/deckforge)";
const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub images_dir: PathBuf,
    pub style: Option<String>,
    pub width: u32,
    pub height: u32,
    pub request_timeout: Duration,
    /// Full-restart retries per image, on top of the first attempt.
    pub retries: u32,
    /// Warm-up polls per attempt.
    pub polls: u32,
    /// Backoff schedule between warm-up polls.
    pub poll_backoff: RetryPolicy,
    /// Bodies under this size are warm-up placeholders.
    pub warmup_min_bytes: usize,
}

impl GeneratorConfig {
    pub fn new(images_dir: PathBuf) -> Self {
        Self {
            base_url: "https://image.pollinations.ai/prompt".to_string(),
            images_dir,
            style: None,
            width: 768,
            height: 512,
            request_timeout: Duration::from_millis(20_000),
            retries: 2,
            polls: 4,
            poll_backoff: RetryPolicy::default(),
            warmup_min_bytes: 20_000,
        }
    }
}

pub struct PollinationsGenerator {
    config: GeneratorConfig,
    client: reqwest::Client,
}

struct FetchedBody {
    bytes: Vec<u8>,
    content_type: String,
}

impl PollinationsGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Render request URL: encoded prompt in the path, stable per-row seed
    /// in the query.
    fn build_url(&self, prompt: &str, seed: usize) -> String {
        format!(
            "{}/{}?width={}&height={}&nologo=true&seed={}",
            self.config.base_url,
            urlencoding::encode(prompt),
            self.config.width,
            self.config.height,
            seed
        )
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedBody> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_IMAGES)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {status}");
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedBody {
            bytes,
            content_type,
        })
    }

    /// One full attempt: fetch, then poll through the warm-up window.
    /// Errors if the body never crosses the size threshold.
    async fn fetch_real_image(&self, url: &str) -> Result<FetchedBody> {
        let mut body = self.fetch_once(url).await?;
        let mut poll = 0u32;

        while body.bytes.len() < self.config.warmup_min_bytes && poll < self.config.polls {
            poll += 1;
            let delay = self.config.poll_backoff.delay_for_attempt(poll);
            debug!(
                size = body.bytes.len(),
                content_type = %body.content_type,
                poll,
                polls = self.config.polls,
                delay_ms = delay.as_millis() as u64,
                "Warm-up placeholder, polling"
            );
            tokio::time::sleep(delay).await;
            body = self.fetch_once(url).await?;
        }

        if body.bytes.len() < self.config.warmup_min_bytes {
            anyhow::bail!(
                "image too small after polling (size={}B, type={})",
                body.bytes.len(),
                body.content_type
            );
        }
        Ok(body)
    }

    /// Try to render and save one image, restarting the attempt (polling
    /// included) up to the retry budget.
    async fn try_save(&self, url: &str, out_folder: &Path, seq: usize) -> Result<PathBuf> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_real_image(url).await {
                Ok(body) => {
                    let ext = infer::get(&body.bytes)
                        .map(|kind| kind.extension())
                        .unwrap_or("webp");
                    let out_path = out_folder.join(format!("{seq:06}.{ext}"));
                    tokio::fs::write(&out_path, &body.bytes)
                        .await
                        .with_context(|| format!("write {}", out_path.display()))?;
                    debug!(path = %out_path.display(), bytes = body.bytes.len(), "Generated image saved");
                    return Ok(out_path);
                }
                Err(e) => {
                    if attempt > self.config.retries {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "Generation attempt failed, restarting");
                }
            }
        }
    }
}

#[async_trait]
impl ImageAcquirer for PollinationsGenerator {
    fn name(&self) -> &str {
        "generate"
    }

    fn cache_key(&self, index: usize, source_text: &str) -> String {
        let prompt = text::build_generation_prompt(source_text, self.config.style.as_deref());
        naming::build_filename(index, &prompt, "")
    }

    async fn acquire(
        &self,
        index: usize,
        source_text: &str,
        count: usize,
    ) -> Result<Vec<ImageResult>> {
        let prompt = text::build_generation_prompt(source_text, self.config.style.as_deref());
        let out_folder = self.config.images_dir.join(self.cache_key(index, source_text));
        tokio::fs::create_dir_all(&out_folder)
            .await
            .with_context(|| format!("create output folder {}", out_folder.display()))?;

        let url = self.build_url(&prompt, index);
        info!(index, prompt = %prompt, "Generation prompt");

        let mut saved = Vec::new();
        let mut seq = 1usize;
        for _ in 0..count {
            match self.try_save(&url, &out_folder, seq).await {
                Ok(path) => {
                    saved.push(ImageResult {
                        path,
                        source: ImageSource::Generate,
                    });
                    seq += 1;
                }
                Err(e) => {
                    warn!(index, error = %e, "Generation failed permanently");
                }
            }
        }

        if saved.is_empty() {
            warn!(index, "No images generated");
        } else {
            info!(index, generated = saved.len(), requested = count, "Generation finished");
        }
        Ok(saved)
    }
}
