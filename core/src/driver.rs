//! `GenericDriver` (§4.4 C7): the per-request pipeline every resolver plugin
//! runs through — rate limit, task gating, cache-hit fast path, resolution,
//! delivery-mode branching, caching, and usage recording.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::caption::{chunk_media_group, escape_html, with_less_flag};
use crate::config::Config;
use crate::error::{DriverError, TransportError};
use crate::ports::{BlobUploader, InputMedia, Messenger};
use crate::resolver::Resolver;
use crate::cache::HandleCache;
use crate::rate_limiter::RateLimiter;
use crate::retry::with_retry;
use crate::task_manager::{TaskGuard, TaskManager};
use crate::usage::UsageRecorder;
use crate::types::{ContentType, FileHandle, FileType, HandleCacheEntry, ParseMode, QualityOption, ReplyMarkup, UsageRecord};

/// `size_mb` is a resolver-side estimate (bitrate×duration or a response
/// header), not a guaranteed byte count — the oversize gate gets the same
/// ±10% slack as bilibili's DASH-rendition picker (§9 open question).
const SIZE_ESTIMATE_TOLERANCE: f64 = 1.1;

/// Everything one `GenericDriver::handle` call needs to identify the caller
/// and the message it's responding to.
pub struct RequestInfo {
    pub chat_id: i64,
    pub uid: i64,
    pub uname: String,
    pub full_name: String,
    pub input_text: String,
    pub url: String,
    pub platform: String,
}

pub struct GenericDriver {
    pub rate_limiter: Arc<RateLimiter>,
    pub task_manager: Arc<TaskManager>,
    pub cache: Arc<HandleCache>,
    pub usage: Arc<UsageRecorder>,
    pub messenger: Arc<dyn Messenger>,
    pub blob_uploader: Option<Arc<dyn BlobUploader>>,
    pub config: Config,
}

impl GenericDriver {
    /// Run the full §4.4 pipeline for one inbound URL. Returns `Ok(())`
    /// whenever the driver reached a terminal state it already reported to
    /// the user (including "blocked" skips); `Err` only for states the
    /// caller (dispatcher) still needs to act on.
    pub async fn handle(&self, req: RequestInfo, resolver: &dyn Resolver) -> Result<(), DriverError> {
        // 1. gate by RateLimiter
        if !self.rate_limiter.allow(req.uid) {
            return Ok(());
        }

        // 2. gate by TaskManager
        let Some(_guard) = TaskGuard::acquire(&self.task_manager, req.uid) else {
            self.messenger
                .send_text(req.chat_id, "already running, please wait", ParseMode::Plain, None)
                .await?;
            return Ok(());
        };

        // 3. placeholder
        let placeholder_id = self
            .messenger
            .send_text(req.chat_id, "processing...", ParseMode::Plain, None)
            .await?;

        let start = Instant::now();
        let outcome = self.run_pipeline(&req, resolver, placeholder_id).await;

        let work_time_s = UsageRecorder::clamp_work_time(start.elapsed().as_secs_f64());
        let record = match &outcome {
            Ok((vid, title, parsed_url, size_mb, is_cached_hit)) => UsageRecord {
                timestamp: chrono_like_timestamp(),
                uid: req.uid,
                uname: req.uname.clone(),
                full_name: req.full_name.clone(),
                platform: req.platform.clone(),
                input_text: req.input_text.clone(),
                url: req.url.clone(),
                vid: vid.clone(),
                title: title.clone(),
                parsed_url: parsed_url.clone(),
                size_mb: *size_mb,
                is_cached_hit: *is_cached_hit,
                parse_success: true,
                parse_exception: None,
                work_time_s,
                cache_info: None,
            },
            Err(e) => UsageRecord {
                timestamp: chrono_like_timestamp(),
                uid: req.uid,
                uname: req.uname.clone(),
                full_name: req.full_name.clone(),
                platform: req.platform.clone(),
                input_text: req.input_text.clone(),
                url: req.url.clone(),
                vid: String::new(),
                title: String::new(),
                parsed_url: String::new(),
                size_mb: 0.0,
                is_cached_hit: false,
                parse_success: false,
                parse_exception: Some(e.to_string()),
                work_time_s,
                cache_info: None,
            },
        };
        if let Err(e) = self.usage.record(record) {
            log::error!("[driver] failed to persist usage record: {e}");
        }
        // 14. TaskGuard releases on drop.

        outcome.map(|_| ())
    }

    /// Steps 4-12: everything between the placeholder and the usage record.
    async fn run_pipeline(
        &self,
        req: &RequestInfo,
        resolver: &dyn Resolver,
        placeholder_id: i64,
    ) -> Result<(String, String, String, f64, bool), DriverError> {
        // 5. peek + cache-hit fast path
        let peek_cfg = self.config.platform_timeouts.peek;
        let peek_result = with_retry(peek_cfg.retries, Duration::from_secs(peek_cfg.timeout_secs), || resolver.peek(&req.url)).await;
        if let Ok((vid, title)) = &peek_result {
            if !vid.is_empty() {
                if let Some(cached) = self.cache.get_full(vid) {
                    match self
                        .messenger
                        .send_by_handle(
                            req.chat_id,
                            &cached.file_id,
                            cached.special.as_deref(),
                            cached_caption(&cached).as_deref(),
                            cached.parse_mode,
                            cached.reply.as_ref(),
                        )
                        .await
                    {
                        Ok(()) => {
                            let _ = self.messenger.delete_message(req.chat_id, placeholder_id).await;
                            return Ok((vid.clone(), title.clone(), String::new(), 0.0, true));
                        }
                        Err(e) if e.is_stale_reference() => {
                            log::warn!("[driver] cached handle for vid={vid} went stale, evicting and re-resolving");
                            let _ = self.cache.delete(vid);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        // 6. full resolution
        let parse_cfg = self.config.platform_timeouts.parse;
        let result = with_retry(parse_cfg.retries, Duration::from_secs(parse_cfg.timeout_secs), || resolver.parse(&req.url)).await?;

        // 7. failure
        if !result.success {
            let text = result.error_message.clone().unwrap_or_else(|| "sorry, something went wrong".to_string());
            self.messenger.edit_text(req.chat_id, placeholder_id, &text).await?;
            return Err(DriverError::PlatformUnavailable(text));
        }

        // 8. link passthrough (also covers the fallback plugin's usage-help path)
        if result.content_type == ContentType::Link {
            let text = result.text_message.clone().unwrap_or_default();
            self.messenger.send_text(req.chat_id, &text, ParseMode::Html, None).await?;
            self.messenger.delete_message(req.chat_id, placeholder_id).await.ok();
            if !result.vid.is_empty() {
                self.cache_link_result(&result);
            }
            return Ok((result.vid.clone(), result.title.clone(), result.download_url.clone(), result.size_mb, false));
        }

        // 9. quality selection
        if result.needs_quality_selection && !result.quality_options.is_empty() {
            return self.deliver_with_quality_selection(req, &result, placeholder_id).await;
        }

        // 10. plain delivery
        self.deliver_plain(req, &result, placeholder_id).await
    }

    async fn deliver_with_quality_selection(
        &self,
        req: &RequestInfo,
        result: &crate::types::ParseResult,
        placeholder_id: i64,
    ) -> Result<(String, String, String, f64, bool), DriverError> {
        let keyboard = build_quality_keyboard(&result.quality_options, result.audio_uri.as_deref());
        let caption = with_less_flag(&escape_html(&result.title), self.config.less_flag.as_deref());

        let preview_local = result
            .media_items
            .iter()
            .find(|m| m.file_type == FileType::Video)
            .map(|m| m.local_path.clone());

        let handle = if let Some(local_path) = &preview_local {
            match self
                .messenger
                .send_video(req.chat_id, local_path, Some(&caption), ParseMode::Html, Some(&keyboard))
                .await
            {
                Ok(h) => h,
                Err(_) => {
                    self.messenger
                        .send_text(req.chat_id, &caption, ParseMode::Html, Some(&keyboard))
                        .await?;
                    String::new()
                }
            }
        } else {
            self.messenger
                .send_text(req.chat_id, &caption, ParseMode::Html, Some(&keyboard))
                .await?;
            String::new()
        };

        self.messenger.delete_message(req.chat_id, placeholder_id).await.ok();

        if !handle.is_empty() && !result.vid.is_empty() {
            let entry = HandleCacheEntry {
                title: result.title.clone(),
                file_id: FileHandle::Single(handle),
                reply: Some(keyboard),
                parse_mode: ParseMode::Html,
                special: Some("video".to_string()),
            };
            if let Err(e) = self.cache.put(&result.vid, entry) {
                log::error!("[driver] failed to cache quality-selection result: {e}");
            }
        }

        Ok((result.vid.clone(), result.title.clone(), result.download_url.clone(), result.size_mb, false))
    }

    async fn deliver_plain(
        &self,
        req: &RequestInfo,
        result: &crate::types::ParseResult,
        placeholder_id: i64,
    ) -> Result<(String, String, String, f64, bool), DriverError> {
        let caption = with_less_flag(&escape_html(&result.title), self.config.less_flag.as_deref());

        if result.size_mb > self.config.oversize_threshold_mb * SIZE_ESTIMATE_TOLERANCE {
            let Some(uploader) = &self.blob_uploader else {
                let text = "file too large to deliver and no upload host configured".to_string();
                self.messenger.edit_text(req.chat_id, placeholder_id, &text).await?;
                return Err(DriverError::Internal(text));
            };
            let local_path = result
                .media_items
                .first()
                .map(|m| m.local_path.as_str())
                .unwrap_or_default();
            let hosted_url = uploader.upload(local_path).await?;
            let text = format!("{caption}\n<a href=\"{hosted_url}\">download</a>");
            self.messenger.send_text(req.chat_id, &text, ParseMode::Html, None).await?;
            self.messenger.delete_message(req.chat_id, placeholder_id).await.ok();
            if !result.vid.is_empty() {
                let entry = HandleCacheEntry {
                    title: result.title.clone(),
                    file_id: FileHandle::Single(hosted_url),
                    reply: None,
                    parse_mode: ParseMode::Html,
                    special: Some(uploader.name().to_string()),
                };
                if let Err(e) = self.cache.put(&result.vid, entry) {
                    log::error!("[driver] failed to cache uploaded handle: {e}");
                }
            }
            return Ok((result.vid.clone(), result.title.clone(), result.download_url.clone(), result.size_mb, false));
        }

        let handle = match result.content_type {
            ContentType::Video => {
                let local_path = result.media_items.first().map(|m| m.local_path.as_str()).unwrap_or_default();
                let handle = self.messenger.send_video(req.chat_id, local_path, Some(&caption), ParseMode::Html, None).await?;
                Some((FileHandle::Single(handle), "video"))
            }
            ContentType::Audio => {
                let local_path = result.media_items.first().map(|m| m.local_path.as_str()).unwrap_or_default();
                let handle = self.messenger.send_document(req.chat_id, local_path, Some(&caption), ParseMode::Html, None).await?;
                Some((FileHandle::Single(handle), "document"))
            }
            ContentType::ImageGallery => {
                let handles = self.deliver_gallery(req, result, &caption).await?;
                Some((handles, "gallery"))
            }
            _ => None,
        };

        self.messenger.delete_message(req.chat_id, placeholder_id).await.ok();

        if let (Some((handle, special)), false) = (handle, result.vid.is_empty()) {
            let entry = HandleCacheEntry {
                title: result.title.clone(),
                file_id: handle,
                reply: None,
                parse_mode: ParseMode::Html,
                special: Some(special.to_string()),
            };
            if let Err(e) = self.cache.put(&result.vid, entry) {
                log::error!("[driver] failed to cache delivered handle: {e}");
            }
        }

        Ok((result.vid.clone(), result.title.clone(), result.download_url.clone(), result.size_mb, false))
    }

    /// Gallery cache-hit replay is gated by `images_cache_switch` (§4.4
    /// "Image-gallery cache switch"): caching galleries is harmless, but
    /// CDN-hosted image handles can expire, so replay is opt-in.
    async fn deliver_gallery(
        &self,
        req: &RequestInfo,
        result: &crate::types::ParseResult,
        caption: &str,
    ) -> Result<FileHandle, DriverError> {
        let items: Vec<InputMedia> = result
            .media_items
            .iter()
            .map(|m| InputMedia {
                local_path: m.local_path.clone(),
                is_video: m.file_type == FileType::Video,
                caption: None,
            })
            .collect();

        let chunks = chunk_media_group(&items, caption);
        let mut all_handles = Vec::new();
        for (i, (chunk, chunk_caption)) in chunks.into_iter().enumerate() {
            let mut chunk = chunk;
            if let Some(cap) = chunk_caption {
                if let Some(first) = chunk.first_mut() {
                    first.caption = Some(cap);
                }
            }
            let handles = self.messenger.send_media_group(req.chat_id, &chunk).await?;
            for (handle, item) in handles.into_iter().zip(result.media_items.iter().skip(i * 10)) {
                all_handles.push((item.file_type, handle));
            }
        }

        if !self.config.images_cache_switch {
            return Ok(FileHandle::Many(Vec::new()));
        }
        Ok(FileHandle::gallery(all_handles))
    }

    fn cache_link_result(&self, result: &crate::types::ParseResult) {
        let entry = HandleCacheEntry {
            title: result.title.clone(),
            file_id: FileHandle::Single(result.text_message.clone().unwrap_or_default()),
            reply: None,
            parse_mode: ParseMode::Html,
            special: Some("link".to_string()),
        };
        if let Err(e) = self.cache.put(&result.vid, entry) {
            log::error!("[driver] failed to cache link result: {e}");
        }
    }
}

fn cached_caption(entry: &HandleCacheEntry) -> Option<String> {
    if entry.title.is_empty() {
        None
    } else {
        Some(escape_html(&entry.title))
    }
}

/// Build the inline keyboard for quality selection: URL buttons, two per
/// row, with a trailing music-only row when the result carries audio (§4.4 step 9).
fn build_quality_keyboard(options: &[QualityOption], audio_uri: Option<&str>) -> ReplyMarkup {
    let mut rows: ReplyMarkup = options
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|o| (o.quality_label.clone(), o.download_url.clone()))
                .collect()
        })
        .collect();
    if let Some(audio_uri) = audio_uri {
        rows.push(vec![("music".to_string(), audio_uri.to_string())]);
    }
    rows
}

/// RFC 3339 timestamp stamped onto every `UsageRecord` at the moment it's built.
fn chrono_like_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QualityOption;

    fn opt(label: &str, url: &str) -> QualityOption {
        QualityOption {
            resolution_px: 1080,
            quality_label: label.to_string(),
            download_url: url.to_string(),
            size_mb: 10.0,
            is_default: false,
            bitrate_kbps: 1000,
        }
    }

    #[test]
    fn keyboard_packs_two_options_per_row() {
        let options = vec![opt("1080p", "u1"), opt("720p", "u2"), opt("480p", "u3")];
        let keyboard = build_quality_keyboard(&options, None);
        assert_eq!(keyboard.len(), 2);
        assert_eq!(keyboard[0].len(), 2);
        assert_eq!(keyboard[1].len(), 1);
    }

    #[test]
    fn keyboard_appends_music_row_when_audio_present() {
        let options = vec![opt("1080p", "u1")];
        let keyboard = build_quality_keyboard(&options, Some("a1"));
        assert_eq!(keyboard.last().unwrap(), &vec![("music".to_string(), "a1".to_string())]);
    }
}
