//! Fallback ("unknown") resolver (§4.3): no platform plugin claimed the URL,
//! so there is nothing to download — `parse` always succeeds and routes
//! through the same `content_type=link` path the driver uses for plain text,
//! carrying a usage-help message instead of a hosted URL.

use async_trait::async_trait;

use super::Resolver;
use crate::error::ResolverError;
use crate::types::{ContentType, ParseResult};

/// Shared between the fallback resolver's reply and the bot's `/start` handler.
pub const USAGE_HELP: &str = "I don't recognize that link yet. Supported: douyin, tiktok, bilibili, \
music.163.com, and xiaohongshu share links.";

pub struct FallbackResolver;

#[async_trait]
impl Resolver for FallbackResolver {
    async fn peek(&self, url: &str) -> Result<(String, String), ResolverError> {
        Ok((String::new(), url.to_string()))
    }

    async fn parse(&self, url: &str) -> Result<ParseResult, ResolverError> {
        Ok(ParseResult {
            success: true,
            content_type: ContentType::Link,
            media_items: Vec::new(),
            title: String::new(),
            // Empty vid (I1): a fallback response is never worth caching.
            vid: String::new(),
            original_url: url.to_string(),
            download_url: String::new(),
            size_mb: 0.0,
            text_message: Some(USAGE_HELP.to_string()),
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
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parse_always_succeeds_with_empty_vid() {
        let result = FallbackResolver.parse("https://example.com/x").await.unwrap();
        assert!(result.success);
        assert!(result.vid.is_empty());
        assert_eq!(result.content_type, ContentType::Link);
        assert!(result.text_message.is_some());
    }
}
