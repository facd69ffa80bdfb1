//! Long-form-video ("bilibili") resolver (§4.3). Unlike the short-form
//! platforms, bilibili's DASH streams split video and audio; this plugin
//! auto-picks a quality instead of exposing a ladder, and routes oversized
//! results to the [`BlobUploader`](crate::ports::BlobUploader) port.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{Resolver, ResolverContext};
use crate::downloader::{DownloadOptions, RequestContext};
use crate::error::ResolverError;
use crate::ports::BlobUploader;
use crate::types::{ContentType, MediaItem, ParseResult};

/// Prefer a DASH rendition at or under this size (§4.3 "≤50 MB preferred").
const PREFERRED_MAX_MB: f64 = 50.0;
/// Above this, mux-and-upload is no longer attempted; only an external link is offered.
const MERGE_MAX_MB: f64 = 150.0;
/// `bandwidth × duration` is an estimate, not the real encoded size — give
/// gating decisions the same ±10% slack the driver applies elsewhere.
const SIZE_ESTIMATE_TOLERANCE: f64 = 1.1;

const VIEW_API: &str = "https://api.bilibili.com/x/web-interface/view";
const PLAYURL_API: &str = "https://api.bilibili.com/x/player/playurl";

pub struct BilibiliResolver {
    ctx: ResolverContext,
    blob_uploader: Option<Arc<dyn BlobUploader>>,
}

impl BilibiliResolver {
    pub fn new(ctx: ResolverContext, blob_uploader: Option<Arc<dyn BlobUploader>>) -> Self {
        Self { ctx, blob_uploader }
    }

    fn cookie_header(&self) -> Option<String> {
        self.ctx.sessdata.as_ref().map(|s| format!("SESSDATA={s}"))
    }

    async fn fetch_view(&self, bvid: &str) -> Result<Value, ResolverError> {
        let resp = self
            .ctx
            .http
            .get(VIEW_API)
            .query(&[("bvid", bvid)])
            .send()
            .await?;
        let body: Value = resp.json().await.map_err(|e| ResolverError::ContentUnavailable(e.to_string()))?;
        body.get("data")
            .cloned()
            .ok_or_else(|| ResolverError::ContentUnavailable("missing view data".to_string()))
    }

    async fn fetch_playurl(&self, bvid: &str, cid: u64) -> Result<Value, ResolverError> {
        let resp = self
            .ctx
            .http
            .get(PLAYURL_API)
            .query(&[("bvid", bvid), ("cid", &cid.to_string()), ("fnval", "16")])
            .send()
            .await?;
        let body: Value = resp.json().await.map_err(|e| ResolverError::ContentUnavailable(e.to_string()))?;
        body.get("data")
            .cloned()
            .ok_or_else(|| ResolverError::ContentUnavailable("missing playurl data".to_string()))
    }
}

fn extract_bvid(url: &str) -> Option<String> {
    let re = Regex::new(r"(BV[0-9A-Za-z]{10})").unwrap();
    re.captures(url).map(|c| c[1].to_string())
}

#[async_trait]
impl Resolver for BilibiliResolver {
    async fn peek(&self, url: &str) -> Result<(String, String), ResolverError> {
        let bvid = extract_bvid(url).ok_or_else(|| ResolverError::UnsupportedUrl(url.to_string()))?;
        let view = self.fetch_view(&bvid).await?;
        let title = view.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok((bvid, title))
    }

    async fn parse(&self, url: &str) -> Result<ParseResult, ResolverError> {
        let bvid = extract_bvid(url).ok_or_else(|| ResolverError::UnsupportedUrl(url.to_string()))?;
        let view = self.fetch_view(&bvid).await?;
        let title = view.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
        let is_paid_preview = view
            .pointer("/rights/pay")
            .and_then(Value::as_u64)
            .map(|v| v != 0)
            .unwrap_or(false);

        let cid = view
            .pointer("/cid")
            .and_then(Value::as_u64)
            .ok_or_else(|| ResolverError::ContentUnavailable("missing cid".to_string()))?;

        let playurl = self.fetch_playurl(&bvid, cid).await?;
        let video_streams = playurl.pointer("/dash/video").and_then(Value::as_array).cloned().unwrap_or_default();
        let audio_streams = playurl.pointer("/dash/audio").and_then(Value::as_array).cloned().unwrap_or_default();

        if video_streams.is_empty() {
            return Ok(ParseResult::failure("no DASH video streams returned"));
        }

        let best_audio_url = audio_streams
            .iter()
            .filter_map(|a| a.pointer("/base_url").and_then(Value::as_str))
            .next()
            .map(str::to_string);

        let mut candidates: Vec<(&Value, f64)> = video_streams
            .iter()
            .map(|v| {
                let bandwidth = v.get("bandwidth").and_then(Value::as_u64).unwrap_or(0);
                let duration_s = view.get("duration").and_then(Value::as_u64).unwrap_or(0) as f64;
                let size_mb = (bandwidth as f64 * duration_s) / 8.0 / 1024.0 / 1024.0;
                (v, size_mb)
            })
            .collect();
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let picked = candidates
            .iter()
            .find(|(_, mb)| *mb <= PREFERRED_MAX_MB * SIZE_ESTIMATE_TOLERANCE)
            .or_else(|| candidates.iter().find(|(_, mb)| *mb <= MERGE_MAX_MB * SIZE_ESTIMATE_TOLERANCE))
            .or_else(|| candidates.last())
            .copied();

        let Some((video, size_mb)) = picked else {
            return Ok(ParseResult::failure("no usable DASH rendition"));
        };
        let video_url = video
            .pointer("/base_url")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolverError::ContentUnavailable("video stream missing base_url".to_string()))?;

        let dest = self.ctx.save_dir.join(format!("{bvid}_video.m4s"));
        let mut req_ctx = RequestContext::default();
        if let Some(cookie) = self.cookie_header() {
            req_ctx.cookies = Some(cookie);
        }
        self.ctx
            .downloader
            .download(video_url, &dest, &req_ctx, &DownloadOptions::default(), None)
            .await?;

        if size_mb <= MERGE_MAX_MB * SIZE_ESTIMATE_TOLERANCE {
            // Muxing video+audio into a single container is delegated to an
            // external AV-mux step in the driver; here we just hand back
            // both local tracks as media items in download order.
            let mut media_items = vec![MediaItem::video(dest.to_string_lossy().to_string())];
            if let Some(audio_url) = &best_audio_url {
                let audio_dest = self.ctx.save_dir.join(format!("{bvid}_audio.m4s"));
                self.ctx
                    .downloader
                    .download(audio_url, &audio_dest, &req_ctx, &DownloadOptions::default(), None)
                    .await?;
                media_items.push(MediaItem::audio(audio_dest.to_string_lossy().to_string()));
            }
            return Ok(ParseResult {
                success: true,
                content_type: ContentType::Video,
                media_items,
                title,
                vid: bvid,
                original_url: url.to_string(),
                download_url: video_url.to_string(),
                size_mb,
                text_message: None,
                audio_uri: None,
                audio_title: None,
                quality_options: Vec::new(),
                needs_quality_selection: false,
                preview_url: None,
                bili_preview_video: is_paid_preview,
                error_message: None,
            });
        }

        let Some(uploader) = &self.blob_uploader else {
            return Ok(ParseResult::failure("result exceeds merge threshold and no blob uploader is configured"));
        };
        let hosted_url = uploader.upload(&dest.to_string_lossy()).await.map_err(|e| ResolverError::ContentUnavailable(e.to_string()))?;

        Ok(ParseResult {
            success: true,
            content_type: ContentType::Link,
            media_items: Vec::new(),
            title,
            vid: bvid,
            original_url: url.to_string(),
            download_url: hosted_url.clone(),
            size_mb,
            text_message: Some(hosted_url),
            audio_uri: None,
            audio_title: None,
            quality_options: Vec::new(),
            needs_quality_selection: false,
            preview_url: None,
            bili_preview_video: is_paid_preview,
            error_message: None,
        })
    }

    fn platform_name(&self) -> &'static str {
        "bilibili"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bvid_matches_standard_id() {
        assert_eq!(
            extract_bvid("https://www.bilibili.com/video/BV1xx411c7mD"),
            Some("BV1xx411c7mD".to_string())
        );
    }

    #[test]
    fn extract_bvid_returns_none_without_match() {
        assert_eq!(extract_bvid("https://www.bilibili.com/video/av12345"), None);
    }
}
