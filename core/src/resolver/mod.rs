//! Platform resolver framework (§4.3). Every plugin implements the same
//! two-operation [`Resolver`] contract; [`Dispatcher`](crate::dispatcher)
//! picks which one handles a given URL.

pub mod bilibili;
pub mod douyin;
pub mod fallback;
pub mod music;
pub mod tiktok;
pub mod xhs;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::downloader::Downloader;
use crate::error::ResolverError;
use crate::ports::BrowserPool;
use crate::types::{ParseResult, QualityOption};

/// Shared dependencies every resolver plugin is built from.
#[derive(Clone)]
pub struct ResolverContext {
    pub http: Client,
    pub downloader: Arc<Downloader>,
    pub browser_pool: Option<Arc<dyn BrowserPool>>,
    pub sessdata: Option<String>,
    pub web_session: Option<String>,
    pub save_dir: std::path::PathBuf,
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Cheapest possible call determining `(vid, title)` — no media download (§4.3).
    async fn peek(&self, url: &str) -> Result<(String, String), ResolverError>;

    /// Full resolution into a [`ParseResult`].
    async fn parse(&self, url: &str) -> Result<ParseResult, ResolverError>;

    /// Platform name used in logs, usage records, and the admin status line.
    fn platform_name(&self) -> &'static str;
}

/// Preview-size ladder shared by douyin/tiktok (§4.3: "preview ≤20 MB
/// preferred, else ≤50 MB, else highest"). `options` must already be sorted
/// by [`QualityOption::sort_for_display`].
pub fn pick_preview_option(options: &[QualityOption], preview_mb: f64) -> Option<QualityOption> {
    if options.is_empty() {
        return None;
    }
    options
        .iter()
        .find(|o| o.size_mb > 0.0 && o.size_mb <= preview_mb)
        .or_else(|| options.iter().find(|o| o.size_mb > 0.0 && o.size_mb <= 50.0))
        .or_else(|| options.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(size_mb: f64) -> QualityOption {
        QualityOption {
            resolution_px: 1080,
            quality_label: "1080p".to_string(),
            download_url: "https://example.com/v".to_string(),
            size_mb,
            is_default: false,
            bitrate_kbps: 2000,
        }
    }

    #[test]
    fn prefers_option_under_preview_size() {
        let options = vec![opt(60.0), opt(15.0), opt(40.0)];
        let picked = pick_preview_option(&options, 20.0).unwrap();
        assert_eq!(picked.size_mb, 15.0);
    }

    #[test]
    fn falls_back_to_under_50_when_nothing_under_preview() {
        let options = vec![opt(60.0), opt(45.0)];
        let picked = pick_preview_option(&options, 20.0).unwrap();
        assert_eq!(picked.size_mb, 45.0);
    }

    #[test]
    fn falls_back_to_first_when_everything_is_oversized() {
        let options = vec![opt(120.0), opt(90.0)];
        let picked = pick_preview_option(&options, 20.0).unwrap();
        assert_eq!(picked.size_mb, 120.0);
    }

    #[test]
    fn empty_options_returns_none() {
        assert!(pick_preview_option(&[], 20.0).is_none());
    }
}
