//! Core data model shared by every resolver, the driver, and the cache.
//!
//! Mirrors §3 of the specification: `ParseResult` is the uniform output of
//! every platform plugin; `HandleCacheEntry` is what the persistent cache
//! stores under a `vid`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What a resolved post actually contains, driving delivery mode in the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Audio,
    ImageGallery,
    Link,
    Unknown,
}

/// The kind of a single media item inside `ParseResult::media_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Video,
    Photo,
    Audio,
}

/// One local file produced by a resolver's `parse`, ready for upload.
/// `local_path` must exist on disk at delivery time (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub local_path: String,
    pub file_type: FileType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<u32>,
}

impl MediaItem {
    pub fn video(local_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            file_type: FileType::Video,
            width: None,
            height: None,
            duration_seconds: None,
        }
    }

    pub fn photo(local_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            file_type: FileType::Photo,
            width: None,
            height: None,
            duration_seconds: None,
        }
    }

    pub fn audio(local_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            file_type: FileType::Audio,
            width: None,
            height: None,
            duration_seconds: None,
        }
    }
}

/// One `(resolution, bitrate, size, URL)` tuple surfaced as a download button.
///
/// Ordering rule (§3): `is_default` first, then resolution descending, ties
/// broken by bitrate descending — callers sort with [`QualityOption::cmp_for_display`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityOption {
    pub resolution_px: u32,
    pub quality_label: String,
    pub download_url: String,
    pub size_mb: f64,
    pub is_default: bool,
    /// Used only to break ties when `resolution_px` matches; not part of the
    /// public §3 field table but needed to implement the ordering rule.
    pub bitrate_kbps: u32,
}

impl QualityOption {
    /// Sort key implementing the §3 ordering rule.
    /// Reverse so that a plain ascending sort yields the spec's descending order.
    fn sort_key(&self) -> (std::cmp::Reverse<bool>, std::cmp::Reverse<u32>, std::cmp::Reverse<u32>) {
        (
            std::cmp::Reverse(self.is_default),
            std::cmp::Reverse(self.resolution_px),
            std::cmp::Reverse(self.bitrate_kbps),
        )
    }

    /// Sort `options` in place per the §3 ordering rule.
    pub fn sort_for_display(options: &mut [QualityOption]) {
        options.sort_by_key(|o| o.sort_key());
    }
}

/// The uniform output of every `Resolver::parse` call (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub success: bool,
    pub content_type: ContentType,
    pub media_items: Vec<MediaItem>,
    pub title: String,
    /// Cache key for the whole artifact. Empty ⇒ do not cache (I1).
    pub vid: String,
    pub original_url: String,
    pub download_url: String,
    pub size_mb: f64,
    pub text_message: Option<String>,
    pub audio_uri: Option<String>,
    pub audio_title: Option<String>,
    pub quality_options: Vec<QualityOption>,
    pub needs_quality_selection: bool,
    pub preview_url: Option<String>,
    pub bili_preview_video: bool,
    pub error_message: Option<String>,
}

impl ParseResult {
    /// Build a failed result — the only shape `success=false` is allowed to take.
    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            content_type: ContentType::Unknown,
            media_items: Vec::new(),
            title: String::new(),
            vid: String::new(),
            original_url: String::new(),
            download_url: String::new(),
            size_mb: 0.0,
            text_message: None,
            audio_uri: None,
            audio_title: None,
            quality_options: Vec::new(),
            needs_quality_selection: false,
            preview_url: None,
            bili_preview_video: false,
            error_message: Some(error_message.into()),
        }
    }
}

/// `parse_mode` of a cached/sent caption — mirrors the bot transport's enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    Plain,
    Html,
    MarkdownV2,
}

impl Default for ParseMode {
    fn default() -> Self {
        ParseMode::Plain
    }
}

/// Remote handle(s) held by a cache entry — a single video/audio/document,
/// or (for galleries) an ordered list of `"VIDEO"`/`"IMAGE"`-prefixed handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileHandle {
    Single(String),
    Many(Vec<String>),
}

impl FileHandle {
    /// Build the `"VIDEO"`/`"IMAGE"`-prefixed list form for a gallery delivery.
    pub fn gallery(items: impl IntoIterator<Item = (FileType, String)>) -> Self {
        FileHandle::Many(
            items
                .into_iter()
                .map(|(ft, handle)| {
                    let tag = match ft {
                        FileType::Video => "VIDEO",
                        _ => "IMAGE",
                    };
                    format!("{tag}:{handle}")
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FileHandle::Single(s) => s.is_empty(),
            FileHandle::Many(v) => v.is_empty(),
        }
    }
}

/// Split a gallery item handle built by [`FileHandle::gallery`] back into its
/// file-type tag and the bare transport handle.
pub fn split_gallery_tag(raw: &str) -> (FileType, &str) {
    match raw.split_once(':') {
        Some(("VIDEO", rest)) => (FileType::Video, rest),
        Some((_, rest)) => (FileType::Photo, rest),
        None => (FileType::Photo, raw),
    }
}

/// An inline keyboard as stored/replayed by the cache — a row-major button matrix.
/// Each button is `(label, url)`; the bot transport owns the actual widget type.
pub type ReplyMarkup = Vec<Vec<(String, String)>>;

/// What the cache stores under `vid` (§3). `special` drives replay dispatch:
/// `Some("video")`/`None` and `Some("document")` are transport-native remote
/// handles; `Some("gallery")` means `file_id` is a `FileHandle::Many` whose
/// items carry their own per-item type tag; anything else (`Some("link")`,
/// or an upload host name like `Some("catbox")`) means `file_id` is an
/// external URL rather than a transport-native remote handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleCacheEntry {
    pub title: String,
    pub file_id: FileHandle,
    pub reply: Option<ReplyMarkup>,
    #[serde(default)]
    pub parse_mode: ParseMode,
    pub special: Option<String>,
}

impl HandleCacheEntry {
    pub fn simple(title: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            file_id: FileHandle::Single(file_id.into()),
            reply: None,
            parse_mode: ParseMode::Plain,
            special: None,
        }
    }
}

/// One append-only line in the usage log (§3). `work_time_s = None` when the
/// measured wall time fell outside `[0, 3600]` (see `UsageRecorder::clamp_work_time`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: String,
    pub uid: i64,
    pub uname: String,
    pub full_name: String,
    pub platform: String,
    pub input_text: String,
    pub url: String,
    pub vid: String,
    pub title: String,
    pub parsed_url: String,
    pub size_mb: f64,
    pub is_cached_hit: bool,
    pub parse_success: bool,
    pub parse_exception: Option<String>,
    pub work_time_s: Option<f64>,
    pub cache_info: Option<String>,
}

/// Extra per-request headers a resolver/downloader may need, keyed
/// case-sensitively as the caller provided them.
pub type HeaderMap = HashMap<String, Vec<String>>;
