//! Search-based image acquisition: an ordered provider chain.
//!
//! Providers are consulted in fixed priority order — Wikipedia lead image
//! (direct, highest precision), Wikimedia Commons search (broad media
//! API), Openverse (generic fallback) — aggregating a deduplicated
//! candidate URL list. Later providers are only queried while we are still
//! short of candidates. Candidates are then downloaded in order with size
//! and type validation until `count` images are saved or the list runs
//! out. Nothing in the chain is fatal: a provider timeout or a bad
//! download is a log line and a skip.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::ImageAcquirer;
use crate::domain::{ImageResult, ImageSource};
use crate::naming;
use crate::text;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124 Safari/537.36";
const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

/// Image extensions accepted from downloads, matched against sniffed
/// content, not the URL.
const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub images_dir: PathBuf,
    /// Candidate URLs requested per provider.
    pub max_per_provider: usize,
    /// Downloads smaller than this are rejected.
    pub min_download_bytes: usize,
    pub request_timeout: Duration,
    /// Wikipedia language edition for the lead-image lookup.
    pub wiki_lang: String,
}

impl SearchConfig {
    pub fn new(images_dir: PathBuf) -> Self {
        Self {
            images_dir,
            max_per_provider: 12,
            min_download_bytes: 4096,
            request_timeout: Duration::from_millis(15_000),
            wiki_lang: "de".to_string(),
        }
    }
}

pub struct SearchFetcher {
    config: SearchConfig,
    client: reqwest::Client,
}

impl SearchFetcher {
    pub fn new(config: SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {status}");
        }
        Ok(response.json().await?)
    }

    /// Provider 1: Wikipedia page lead image (pageimages original).
    async fn wiki_lead_image(&self, query: &str) -> Result<Vec<String>> {
        let url = format!(
            "https://{}.wikipedia.org/w/api.php?action=query&format=json&prop=pageimages\
             &piprop=original&titles={}",
            self.config.wiki_lang,
            urlencoding::encode(query)
        );
        let json = self.get_json(&url).await?;

        let mut urls = Vec::new();
        if let Some(pages) = json.pointer("/query/pages").and_then(Value::as_object) {
            for page in pages.values() {
                if let Some(src) = page.pointer("/original/source").and_then(Value::as_str) {
                    debug!(url = %src, "Wikipedia lead image");
                    urls.push(src.to_string());
                }
            }
        }
        Ok(urls)
    }

    /// Provider 2: Wikimedia Commons full-text search with direct image
    /// URLs via imageinfo.
    async fn commons_search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let url = format!(
            "https://commons.wikimedia.org/w/api.php?action=query&format=json\
             &generator=search&gsrsearch={}&gsrlimit={}&prop=imageinfo&iiprop=url",
            urlencoding::encode(query),
            limit.clamp(1, 20)
        );
        let json = self.get_json(&url).await?;

        let mut urls = Vec::new();
        if let Some(pages) = json.pointer("/query/pages").and_then(Value::as_object) {
            for page in pages.values() {
                if let Some(u) = page.pointer("/imageinfo/0/url").and_then(Value::as_str) {
                    urls.push(u.to_string());
                }
            }
        }
        debug!(count = urls.len(), "Commons search candidates");
        Ok(urls)
    }

    /// Provider 3: Openverse, the lowest-precision fallback.
    async fn openverse_search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let url = format!(
            "https://api.openverse.org/v1/images/?q={}&page_size={}",
            urlencoding::encode(query),
            limit.clamp(1, 20)
        );
        let json = self.get_json(&url).await?;

        let urls: Vec<String> = json
            .pointer("/results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| r.get("url").and_then(Value::as_str))
                    .filter(|u| u.starts_with("http"))
                    .take(limit)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        debug!(count = urls.len(), "Openverse candidates");
        Ok(urls)
    }

    /// Walk the provider chain, deduplicating, stopping early once enough
    /// candidates are gathered relative to the target.
    async fn gather_candidates(&self, query: &str, count: usize) -> Vec<String> {
        let want = count.max(3);
        let mut seen = HashSet::new();
        let mut candidates: Vec<String> = Vec::new();

        let mut absorb = |urls: Vec<String>, candidates: &mut Vec<String>| {
            for url in urls {
                if seen.insert(url.clone()) {
                    candidates.push(url);
                }
            }
        };

        match self.wiki_lead_image(query).await {
            Ok(urls) => absorb(urls, &mut candidates),
            Err(e) => warn!(query, error = %e, "Wikipedia lead image lookup failed"),
        }

        if candidates.len() < want {
            match self.commons_search(query, self.config.max_per_provider).await {
                Ok(urls) => absorb(urls, &mut candidates),
                Err(e) => warn!(query, error = %e, "Commons search failed"),
            }
        }

        if candidates.len() < want {
            match self
                .openverse_search(query, self.config.max_per_provider)
                .await
            {
                Ok(urls) => absorb(urls, &mut candidates),
                Err(e) => warn!(query, error = %e, "Openverse search failed"),
            }
        }

        debug!(query, total = candidates.len(), "Candidate aggregation finished");
        candidates
    }

    /// Referer header pointing at the image's own host; some CDNs refuse
    /// refererless requests.
    fn referer_for(url: &str) -> Option<String> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        Some(format!("{}://{}/", parsed.scheme(), host))
    }

    /// Download one candidate, validating minimum size and sniffed image
    /// type, and save it under a zero-padded sequential name.
    async fn try_download(&self, url: &str, out_folder: &Path, seq: usize) -> Result<PathBuf> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_IMAGES);
        if let Some(referer) = Self::referer_for(url) {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {status}");
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.len() < self.config.min_download_bytes {
            anyhow::bail!("too small ({}B)", bytes.len());
        }

        let ext = infer::get(&bytes)
            .map(|kind| kind.extension())
            .unwrap_or("jpg");
        if !ALLOWED_EXTENSIONS.contains(&ext) {
            anyhow::bail!("unsupported type: {ext}");
        }

        let out_path = out_folder.join(format!("{seq:06}.{ext}"));
        tokio::fs::write(&out_path, &bytes)
            .await
            .with_context(|| format!("write {}", out_path.display()))?;
        debug!(path = %out_path.display(), bytes = bytes.len(), "Image saved");
        Ok(out_path)
    }
}

#[async_trait]
impl ImageAcquirer for SearchFetcher {
    fn name(&self) -> &str {
        "search"
    }

    fn cache_key(&self, index: usize, source_text: &str) -> String {
        let query = text::image_query_from_sentence(source_text);
        naming::build_filename(index, &query, "")
    }

    async fn acquire(
        &self,
        index: usize,
        source_text: &str,
        count: usize,
    ) -> Result<Vec<ImageResult>> {
        let query = text::image_query_from_sentence(source_text);
        let out_folder = self.config.images_dir.join(self.cache_key(index, source_text));
        tokio::fs::create_dir_all(&out_folder)
            .await
            .with_context(|| format!("create output folder {}", out_folder.display()))?;

        let candidates = self.gather_candidates(&query, count).await;

        let mut saved = Vec::new();
        let mut seq = 1usize;
        for url in &candidates {
            if saved.len() >= count {
                break;
            }
            match self.try_download(url, &out_folder, seq).await {
                Ok(path) => {
                    saved.push(ImageResult {
                        path,
                        source: ImageSource::Search,
                    });
                    seq += 1;
                }
                Err(e) => {
                    warn!(index, url, error = %e, "Skipping candidate");
                }
            }
        }

        if saved.is_empty() {
            warn!(index, query = %query, "No images saved");
        } else {
            info!(index, saved = saved.len(), requested = count, query = %query, "Search finished");
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referer_is_origin_of_url() {
        assert_eq!(
            SearchFetcher::referer_for("https://upload.wikimedia.org/a/b.jpg"),
            Some("https://upload.wikimedia.org/".to_string())
        );
        assert_eq!(SearchFetcher::referer_for("not a url"), None);
    }

    #[test]
    fn test_cache_key_uses_search_query_not_prompt() {
        let fetcher = SearchFetcher::new(SearchConfig::new(PathBuf::from("/tmp/images")));
        let key = fetcher.cache_key(5, "Ich sehe (die Katze)");
        // Query is the parenthetical term minus its article.
        assert!(key.starts_with("005-katze-"));
    }
}
