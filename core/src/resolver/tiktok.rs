//! Short-form-video B ("tiktok") resolver. Same quality-ladder rule as
//! [`douyin`](super::douyin) (§4.3), but TikTok's own CDN links are
//! short-TTL redirects, so `download_url` here is used as a 302 target
//! rather than a stable file — callers must not assume it stays valid.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{pick_preview_option, Resolver, ResolverContext};
use crate::downloader::{DownloadOptions, RequestContext};
use crate::error::ResolverError;
use crate::types::{ContentType, MediaItem, ParseResult, QualityOption};

const PREVIEW_MB: f64 = 20.0;
const ITEM_API: &str = "https://api22-normal-c-useast2a.tiktokv.com/aweme/v1/feed/";

pub struct TikTokResolver {
    ctx: ResolverContext,
}

impl TikTokResolver {
    pub fn new(ctx: ResolverContext) -> Self {
        Self { ctx }
    }

    async fn item_id(&self, url: &str) -> Result<String, ResolverError> {
        if let Some(id) = extract_id(url) {
            return Ok(id);
        }
        let resp = self.ctx.http.get(url).send().await?;
        let final_url = resp.url().to_string();
        extract_id(&final_url).ok_or_else(|| ResolverError::ContentUnavailable("no item id in redirected url".to_string()))
    }

    async fn fetch_item(&self, item_id: &str) -> Result<Value, ResolverError> {
        let resp = self
            .ctx
            .http
            .get(ITEM_API)
            .query(&[("aweme_id", item_id)])
            .send()
            .await?;
        let body: Value = resp.json().await.map_err(|e| ResolverError::ContentUnavailable(e.to_string()))?;
        body.pointer("/aweme_list/0")
            .cloned()
            .ok_or_else(|| ResolverError::ContentUnavailable("missing aweme_list entry".to_string()))
    }
}

fn extract_id(url: &str) -> Option<String> {
    let re = Regex::new(r"/video/(\d+)").unwrap();
    re.captures(url).map(|c| c[1].to_string())
}

#[async_trait]
impl Resolver for TikTokResolver {
    async fn peek(&self, url: &str) -> Result<(String, String), ResolverError> {
        let item_id = self.item_id(url).await?;
        let item = self.fetch_item(&item_id).await?;
        let title = item.get("desc").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok((item_id, title))
    }

    async fn parse(&self, url: &str) -> Result<ParseResult, ResolverError> {
        let item_id = self.item_id(url).await?;
        let item = self.fetch_item(&item_id).await?;
        let title = item.get("desc").and_then(Value::as_str).unwrap_or_default().to_string();

        let images = item.get("image_post_info").and_then(|v| v.pointer("/images"));
        if let Some(images) = images.and_then(Value::as_array).cloned().filter(|v| !v.is_empty()) {
            return self.parse_gallery(&item_id, &title, url, &images).await;
        }

        let bitrates = item
            .pointer("/video/bit_rate")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut options: Vec<QualityOption> = bitrates
            .iter()
            .filter_map(|b| {
                let play_url = b.pointer("/play_addr/url_list/0").and_then(Value::as_str)?;
                let size_bytes = b.pointer("/play_addr/data_size").and_then(Value::as_u64).unwrap_or(0);
                let bitrate = b.get("bit_rate").and_then(Value::as_u64).unwrap_or(0) as u32;
                let height = b.get("height").and_then(Value::as_u64).unwrap_or(0) as u32;
                Some(QualityOption {
                    resolution_px: height,
                    quality_label: format!("{height}p"),
                    download_url: play_url.to_string(),
                    size_mb: size_bytes as f64 / 1024.0 / 1024.0,
                    is_default: false,
                    bitrate_kbps: bitrate / 1000,
                })
            })
            .collect();

        if options.is_empty() {
            return Ok(ParseResult::failure("no playable bit_rate entries"));
        }

        QualityOption::sort_for_display(&mut options);
        let mut preview = pick_preview_option(&options, PREVIEW_MB);
        if let Some(preview) = preview.as_mut() {
            preview.is_default = true;
        }

        let mut media_items = Vec::new();
        if let Some(preview) = &preview {
            let dest = self.ctx.save_dir.join(format!("{item_id}_video.mp4"));
            self.ctx
                .downloader
                .download(&preview.download_url, &dest, &RequestContext::default(), &DownloadOptions::default(), None)
                .await?;
            media_items.push(MediaItem::video(dest.to_string_lossy().to_string()));
        }

        Ok(ParseResult {
            success: true,
            content_type: ContentType::Video,
            media_items,
            title,
            vid: item_id,
            original_url: url.to_string(),
            download_url: preview.as_ref().map(|o| o.download_url.clone()).unwrap_or_default(),
            size_mb: preview.as_ref().map(|o| o.size_mb).unwrap_or(0.0),
            text_message: None,
            audio_uri: None,
            audio_title: None,
            preview_url: preview.as_ref().map(|o| o.download_url.clone()),
            quality_options: options,
            // Buttons-only-when-oversize is bilibili's routing, not this
            // plugin's: the ladder is always offered so the user can pick.
            needs_quality_selection: true,
            bili_preview_video: false,
            error_message: None,
        })
    }

    fn platform_name(&self) -> &'static str {
        "tiktok"
    }
}

impl TikTokResolver {
    async fn parse_gallery(
        &self,
        item_id: &str,
        title: &str,
        url: &str,
        images: &[Value],
    ) -> Result<ParseResult, ResolverError> {
        let mut media_items = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let Some(src) = image.pointer("/display_image/url_list/0").and_then(Value::as_str) else {
                continue;
            };
            let dest = self.ctx.save_dir.join(format!("{item_id}_{i}.jpg"));
            self.ctx
                .downloader
                .download(src, &dest, &RequestContext::default(), &DownloadOptions::default(), None)
                .await?;
            media_items.push(MediaItem::photo(dest.to_string_lossy().to_string()));
        }
        Ok(ParseResult {
            success: true,
            content_type: ContentType::ImageGallery,
            media_items,
            title: title.to_string(),
            vid: item_id.to_string(),
            original_url: url.to_string(),
            download_url: String::new(),
            size_mb: 0.0,
            text_message: None,
            audio_uri: None,
            audio_title: None,
            quality_options: Vec::new(),
            needs_quality_selection: false,
            preview_url: None,
            bili_preview_video: false,
            error_message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_id_matches_video_path() {
        assert_eq!(
            extract_id("https://www.tiktok.com/@user/video/7234567890123456789"),
            Some("7234567890123456789".to_string())
        );
    }
}
