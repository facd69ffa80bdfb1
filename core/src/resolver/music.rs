//! Music resolver (§4.3): single quality, typically well under 10 MB, no
//! quality-selection flow at all — the simplest plugin in the table.

use regex::Regex;
use serde_json::Value;

use async_trait::async_trait;

use super::{Resolver, ResolverContext};
use crate::downloader::{DownloadOptions, RequestContext};
use crate::error::ResolverError;
use crate::types::{ContentType, MediaItem, ParseResult};

const SONG_DETAIL_API: &str = "https://music.163.com/api/song/detail";
const SONG_URL_API: &str = "https://music.163.com/api/song/enhance/player/url";

pub struct MusicResolver {
    ctx: ResolverContext,
}

impl MusicResolver {
    pub fn new(ctx: ResolverContext) -> Self {
        Self { ctx }
    }

    async fn fetch_detail(&self, song_id: &str) -> Result<Value, ResolverError> {
        let resp = self
            .ctx
            .http
            .get(SONG_DETAIL_API)
            .query(&[("ids", format!("[{song_id}]"))])
            .send()
            .await?;
        let body: Value = resp.json().await.map_err(|e| ResolverError::ContentUnavailable(e.to_string()))?;
        body.pointer("/songs/0")
            .cloned()
            .ok_or_else(|| ResolverError::ContentUnavailable("missing song detail".to_string()))
    }

    async fn fetch_play_url(&self, song_id: &str) -> Result<String, ResolverError> {
        let resp = self
            .ctx
            .http
            .get(SONG_URL_API)
            .query(&[("id", song_id), ("br", "320000")])
            .send()
            .await?;
        let body: Value = resp.json().await.map_err(|e| ResolverError::ContentUnavailable(e.to_string()))?;
        body.pointer("/data/0/url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ResolverError::ContentUnavailable("track unavailable (region-locked or removed)".to_string()))
    }
}

fn extract_song_id(url: &str) -> Option<String> {
    let re = Regex::new(r"[?&]id=(\d+)").unwrap();
    re.captures(url).map(|c| c[1].to_string())
}

#[async_trait]
impl Resolver for MusicResolver {
    async fn peek(&self, url: &str) -> Result<(String, String), ResolverError> {
        let song_id = extract_song_id(url).ok_or_else(|| ResolverError::UnsupportedUrl(url.to_string()))?;
        let detail = self.fetch_detail(&song_id).await?;
        let title = detail.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok((song_id, title))
    }

    async fn parse(&self, url: &str) -> Result<ParseResult, ResolverError> {
        let song_id = extract_song_id(url).ok_or_else(|| ResolverError::UnsupportedUrl(url.to_string()))?;
        let detail = self.fetch_detail(&song_id).await?;
        let title = detail.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let artist = detail
            .pointer("/ar/0/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown artist")
            .to_string();

        let play_url = self.fetch_play_url(&song_id).await?;
        let dest = self.ctx.save_dir.join(format!("{song_id}.mp3"));
        self.ctx
            .downloader
            .download(&play_url, &dest, &RequestContext::default(), &DownloadOptions::default(), None)
            .await?;

        let size_mb = tokio::fs::metadata(&dest)
            .await
            .map(|m| m.len() as f64 / 1024.0 / 1024.0)
            .unwrap_or(0.0);

        Ok(ParseResult {
            success: true,
            content_type: ContentType::Audio,
            media_items: vec![MediaItem::audio(dest.to_string_lossy().to_string())],
            title: title.clone(),
            vid: song_id,
            original_url: url.to_string(),
            download_url: play_url,
            size_mb,
            text_message: None,
            audio_uri: Some(dest.to_string_lossy().to_string()),
            audio_title: Some(format!("{artist} - {title}")),
            quality_options: Vec::new(),
            needs_quality_selection: false,
            preview_url: None,
            bili_preview_video: false,
            error_message: None,
        })
    }

    fn platform_name(&self) -> &'static str {
        "music"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_song_id_matches_query_param() {
        assert_eq!(
            extract_song_id("https://music.163.com/song?id=1234567"),
            Some("1234567".to_string())
        );
    }
}
