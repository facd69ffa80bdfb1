//! Social-image-post ("xhs") resolver (§4.3): no quality ladder, deliver
//! every image (and any embedded video) in the post, in order.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{Resolver, ResolverContext};
use crate::downloader::{DownloadOptions, RequestContext};
use crate::error::ResolverError;
use crate::types::{ContentType, MediaItem, ParseResult};

pub struct XhsResolver {
    ctx: ResolverContext,
}

impl XhsResolver {
    pub fn new(ctx: ResolverContext) -> Self {
        Self { ctx }
    }

    /// The note page embeds its full state as a `window.__INITIAL_STATE__`
    /// JSON blob server-side rendered into the HTML; no separate API call needed.
    async fn fetch_note_state(&self, url: &str) -> Result<Value, ResolverError> {
        let html = self.ctx.http.get(url).send().await?.text().await?;
        let marker = "window.__INITIAL_STATE__=";
        let start = html.find(marker).ok_or_else(|| ResolverError::ContentUnavailable("note state not found in page".to_string()))?;
        let tail = &html[start + marker.len()..];
        let end = tail.find("</script>").unwrap_or(tail.len());
        let json_text = tail[..end].trim().trim_end_matches(';');
        serde_json::from_str(json_text).map_err(|e| ResolverError::ContentUnavailable(e.to_string()))
    }
}

fn extract_note_id(url: &str) -> Option<String> {
    let re = Regex::new(r"/(?:explore|discovery/item)/([0-9a-f]{24})").unwrap();
    re.captures(url).map(|c| c[1].to_string())
}

#[async_trait]
impl Resolver for XhsResolver {
    async fn peek(&self, url: &str) -> Result<(String, String), ResolverError> {
        let note_id = extract_note_id(url).ok_or_else(|| ResolverError::UnsupportedUrl(url.to_string()))?;
        let state = self.fetch_note_state(url).await?;
        let title = note_title(&state, &note_id);
        Ok((note_id, title))
    }

    async fn parse(&self, url: &str) -> Result<ParseResult, ResolverError> {
        let note_id = extract_note_id(url).ok_or_else(|| ResolverError::UnsupportedUrl(url.to_string()))?;
        let state = self.fetch_note_state(url).await?;
        let title = note_title(&state, &note_id);

        let images = state
            .pointer(&format!("/note/noteDetailMap/{note_id}/note/imageList"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let video_url = state
            .pointer(&format!("/note/noteDetailMap/{note_id}/note/video/url"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut media_items = Vec::with_capacity(images.len() + 1);
        for (i, image) in images.iter().enumerate() {
            let Some(src) = image.get("urlDefault").and_then(Value::as_str) else {
                continue;
            };
            let dest = self.ctx.save_dir.join(format!("{note_id}_{i}.jpg"));
            self.ctx
                .downloader
                .download(src, &dest, &RequestContext::default(), &DownloadOptions::default(), None)
                .await?;
            media_items.push(MediaItem::photo(dest.to_string_lossy().to_string()));
        }
        if let Some(video_url) = &video_url {
            let dest = self.ctx.save_dir.join(format!("{note_id}_video.mp4"));
            self.ctx
                .downloader
                .download(video_url, &dest, &RequestContext::default(), &DownloadOptions::default(), None)
                .await?;
            media_items.push(MediaItem::video(dest.to_string_lossy().to_string()));
        }

        if media_items.is_empty() {
            return Ok(ParseResult::failure("note has no downloadable media"));
        }

        Ok(ParseResult {
            success: true,
            content_type: ContentType::ImageGallery,
            media_items,
            title,
            vid: note_id,
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

    fn platform_name(&self) -> &'static str {
        "xhs"
    }
}

fn note_title(state: &Value, note_id: &str) -> String {
    state
        .pointer(&format!("/note/noteDetailMap/{note_id}/note/title"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_note_id_matches_explore_path() {
        assert_eq!(
            extract_note_id("https://www.xiaohongshu.com/explore/5f1a2b3c4d5e6f7a8b9c0d1e"),
            Some("5f1a2b3c4d5e6f7a8b9c0d1e".to_string())
        );
    }
}
