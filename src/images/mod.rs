//! Image acquisition strategies.
//!
//! Both strategies — the generative renderer and the search-provider chain
//! — sit behind one trait so the scheduler dispatches on configuration
//! instead of scattering mode conditionals, and so tests can substitute
//! mocks. A strategy owns its query derivation: given the raw row text it
//! computes its own prompt or search query, and exposes the cache folder
//! name that derivation implies.

pub mod cache;
pub mod generate;
pub mod search;

use anyhow::Result;
use async_trait::async_trait;

pub use generate::PollinationsGenerator;
pub use search::SearchFetcher;

use crate::domain::ImageResult;

/// A pluggable image source.
#[async_trait]
pub trait ImageAcquirer: Send + Sync {
    /// Strategy name for logs ("generate", "search").
    fn name(&self) -> &str;

    /// Cache folder name (relative to the images dir) for this row. Keyed
    /// by the strategy's own derived query/prompt so the two modes never
    /// share a folder.
    fn cache_key(&self, index: usize, text: &str) -> String;

    /// Acquire up to `count` images for the row, writing them into the
    /// row's cache folder. Provider and download failures only shrink the
    /// result; the only hard error is failing to create the output folder.
    async fn acquire(&self, index: usize, text: &str, count: usize) -> Result<Vec<ImageResult>>;
}
