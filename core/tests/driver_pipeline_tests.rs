//! `GenericDriver` pipeline tests against the literal end-to-end scenarios
//! and invariants, using in-memory `Messenger`/`Resolver`/`BlobUploader` test
//! doubles rather than any real transport.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clipcore::cache::HandleCache;
use clipcore::config::{Config, PlatformTimeouts, SendTimeouts};
use clipcore::driver::{GenericDriver, RequestInfo};
use clipcore::error::{ResolverError, TransportError};
use clipcore::ports::{BlobUploader, InputMedia, Messenger};
use clipcore::rate_limiter::RateLimiter;
use clipcore::resolver::Resolver;
use clipcore::task_manager::{TaskGuard, TaskManager};
use clipcore::types::{ContentType, FileHandle, HandleCacheEntry, MediaItem, ParseMode, ParseResult, ReplyMarkup};
use clipcore::usage::UsageRecorder;

#[derive(Debug, Clone)]
enum Call {
    SendText(String),
    SendVideo { caption: Option<String> },
    SendMediaGroup { n: usize, first_caption: Option<String> },
    SendByHandle { handle: String },
}

#[derive(Default)]
struct RecordingMessenger {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
    /// When set, the next `send_by_handle` call returns this error instead of succeeding.
    send_by_handle_err: Mutex<Option<TransportError>>,
}

impl RecordingMessenger {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, _chat_id: i64, text: &str, _parse_mode: ParseMode, _reply_markup: Option<&ReplyMarkup>) -> Result<i64, TransportError> {
        self.calls.lock().unwrap().push(Call::SendText(text.to_string()));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) as i64)
    }

    async fn edit_text(&self, _chat_id: i64, _message_id: i64, text: &str) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::SendText(text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, _chat_id: i64, _message_id: i64) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_document(&self, _chat_id: i64, _local_path: &str, _caption: Option<&str>, _parse_mode: ParseMode, _reply_markup: Option<&ReplyMarkup>) -> Result<String, TransportError> {
        Ok("FH_doc".to_string())
    }

    async fn send_video(&self, _chat_id: i64, _local_path: &str, caption: Option<&str>, _parse_mode: ParseMode, _reply_markup: Option<&ReplyMarkup>) -> Result<String, TransportError> {
        self.calls.lock().unwrap().push(Call::SendVideo { caption: caption.map(str::to_string) });
        Ok("FH_video".to_string())
    }

    async fn send_audio(&self, _chat_id: i64, _local_path: &str, _caption: Option<&str>) -> Result<String, TransportError> {
        Ok("FH_audio".to_string())
    }

    async fn send_media_group(&self, _chat_id: i64, items: &[InputMedia]) -> Result<Vec<String>, TransportError> {
        let first_caption = items.first().and_then(|i| i.caption.clone());
        self.calls.lock().unwrap().push(Call::SendMediaGroup { n: items.len(), first_caption });
        Ok((0..items.len()).map(|i| format!("FH_media_{i}")).collect())
    }

    async fn send_by_handle(
        &self,
        _chat_id: i64,
        handle: &FileHandle,
        _special: Option<&str>,
        _caption: Option<&str>,
        _parse_mode: ParseMode,
        _reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), TransportError> {
        if let Some(err) = self.send_by_handle_err.lock().unwrap().take() {
            return Err(err);
        }
        let handle = match handle {
            FileHandle::Single(s) => s.clone(),
            FileHandle::Many(v) => v.first().cloned().unwrap_or_default(),
        };
        self.calls.lock().unwrap().push(Call::SendByHandle { handle });
        Ok(())
    }

    async fn chat_action(&self, _chat_id: i64, _action: &str) {}
}

/// Always returns the same scripted `peek`/`parse` outcome; good enough for
/// driving one `GenericDriver::handle` call per test.
struct ScriptedResolver {
    peek: (String, String),
    parse_result: ParseResult,
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn peek(&self, _url: &str) -> Result<(String, String), ResolverError> {
        Ok(self.peek.clone())
    }

    async fn parse(&self, _url: &str) -> Result<ParseResult, ResolverError> {
        Ok(self.parse_result.clone())
    }

    fn platform_name(&self) -> &'static str {
        "test"
    }
}

struct FakeUploader;

#[async_trait]
impl BlobUploader for FakeUploader {
    async fn upload(&self, _local_path: &str) -> Result<String, TransportError> {
        Ok("https://paste.example/X".to_string())
    }

    fn name(&self) -> &'static str {
        "catbox"
    }
}

fn test_config(download_root: &Path) -> Config {
    Config {
        telegram_token: "test-token".to_string(),
        admin_id: 0,
        min_msg_interval_secs: 0.0,
        max_thread_workers: 4,
        images_cache_switch: false,
        sessdata: None,
        web_session: None,
        download_root: download_root.to_path_buf(),
        less_flag: None,
        oversize_threshold_mb: 50.0,
        platform_timeouts: PlatformTimeouts::default(),
        send_timeouts: SendTimeouts::default(),
    }
}

fn req(uid: i64, url: &str) -> RequestInfo {
    RequestInfo {
        chat_id: uid,
        uid,
        uname: "alice".to_string(),
        full_name: "Alice A".to_string(),
        input_text: url.to_string(),
        url: url.to_string(),
        platform: "test".to_string(),
    }
}

fn build_driver(dir: &Path, messenger: Arc<RecordingMessenger>, cache: Arc<HandleCache>, blob_uploader: Option<Arc<dyn BlobUploader>>) -> GenericDriver {
    GenericDriver {
        rate_limiter: Arc::new(RateLimiter::new(0.0)),
        task_manager: Arc::new(TaskManager::new()),
        cache,
        usage: Arc::new(UsageRecorder::load(dir.join("usage.json"))),
        messenger,
        blob_uploader,
        config: test_config(dir),
    }
}

/// Scenario: cache hit, single video — delivered by handle, no new upload.
#[tokio::test]
async fn scenario_cache_hit_single_video() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(HandleCache::load(dir.path().join("cache.json")));
    cache.put("v_123", HandleCacheEntry::simple("Hello", "FH_abc")).unwrap();

    let messenger = Arc::new(RecordingMessenger::default());
    let driver = build_driver(dir.path(), messenger.clone(), cache.clone(), None);

    let resolver = ScriptedResolver {
        peek: ("v_123".to_string(), "Hello".to_string()),
        parse_result: ParseResult::failure("should not be reached"),
    };

    driver.handle(req(42, "https://v.douyin.com/xyz"), &resolver).await.unwrap();

    let calls = messenger.calls();
    assert!(calls.iter().any(|c| matches!(c, Call::SendByHandle { handle } if handle == "FH_abc")));
    assert_eq!(cache.get("v_123"), Some("FH_abc".to_string()));
}

/// Scenario: an oversize long-form video routes through `BlobUploader` and
/// delivers a link instead of the raw file.
#[tokio::test]
async fn scenario_oversize_video_uses_blob_uploader() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(HandleCache::load(dir.path().join("cache.json")));
    let messenger = Arc::new(RecordingMessenger::default());
    let driver = build_driver(dir.path(), messenger.clone(), cache.clone(), Some(Arc::new(FakeUploader)));

    let parse_result = ParseResult {
        success: true,
        content_type: ContentType::Video,
        media_items: vec![MediaItem::video("/t/v.mp4")],
        title: "Big".to_string(),
        vid: "BV9".to_string(),
        size_mb: 78.0,
        ..ParseResult::failure("unused")
    };
    let resolver = ScriptedResolver { peek: (String::new(), String::new()), parse_result };

    driver.handle(req(1, "https://bilibili.com/x"), &resolver).await.unwrap();

    let calls = messenger.calls();
    assert!(calls.iter().any(|c| matches!(c, Call::SendText(t) if t.contains("https://paste.example/X") && t.contains("Big"))));

    let cached = cache.get_full("BV9").unwrap();
    assert_eq!(cached.special.as_deref(), Some("catbox"));
    match cached.file_id {
        FileHandle::Single(s) => assert_eq!(s, "https://paste.example/X"),
        FileHandle::Many(_) => panic!("expected single handle"),
    }
}

/// A 14-item gallery chunks into two `send_media_group` calls, caption only
/// on the first item of the first group.
#[tokio::test]
async fn scenario_gallery_chunks_into_two_groups() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(HandleCache::load(dir.path().join("cache.json")));
    let messenger = Arc::new(RecordingMessenger::default());
    let driver = build_driver(dir.path(), messenger.clone(), cache, None);

    let media_items: Vec<MediaItem> = (0..14)
        .map(|i| if i % 3 == 2 { MediaItem::video(format!("/t/{i}.mp4")) } else { MediaItem::photo(format!("/t/{i}.jpg")) })
        .collect();

    let parse_result = ParseResult {
        success: true,
        content_type: ContentType::ImageGallery,
        media_items,
        title: "Gallery".to_string(),
        vid: "g1".to_string(),
        ..ParseResult::failure("unused")
    };
    let resolver = ScriptedResolver { peek: (String::new(), String::new()), parse_result };

    driver.handle(req(1, "https://xhs.example/x"), &resolver).await.unwrap();

    let groups: Vec<Call> = messenger.calls().into_iter().filter(|c| matches!(c, Call::SendMediaGroup { .. })).collect();
    assert_eq!(groups.len(), 2);
    match &groups[0] {
        Call::SendMediaGroup { n, first_caption } => {
            assert_eq!(*n, 10);
            assert!(first_caption.is_some());
        }
        _ => unreachable!(),
    }
    match &groups[1] {
        Call::SendMediaGroup { n, first_caption } => {
            assert_eq!(*n, 4);
            assert!(first_caption.is_none());
        }
        _ => unreachable!(),
    }
}

/// A second request inside `min_msg_interval_secs` is dropped silently — no
/// reply, no usage record.
#[tokio::test]
async fn scenario_rate_limit_reject_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(HandleCache::load(dir.path().join("cache.json")));
    let messenger = Arc::new(RecordingMessenger::default());
    let usage = Arc::new(UsageRecorder::load(dir.path().join("usage.json")));

    let driver = GenericDriver {
        rate_limiter: Arc::new(RateLimiter::new(3.0)),
        task_manager: Arc::new(TaskManager::new()),
        cache,
        usage: usage.clone(),
        messenger: messenger.clone(),
        blob_uploader: None,
        config: test_config(dir.path()),
    };

    let resolver = ScriptedResolver { peek: (String::new(), String::new()), parse_result: ParseResult::failure("unused") };

    driver.handle(req(7, "https://a.example/1"), &resolver).await.unwrap();
    let calls_after_first = messenger.calls().len();
    driver.handle(req(7, "https://a.example/2"), &resolver).await.unwrap();

    assert_eq!(messenger.calls().len(), calls_after_first, "second request within min_interval must produce no new messenger calls");
    assert_eq!(usage.records_for(7).len(), 1, "only the admitted request gets a usage record");
}

/// A concurrent request for the same uid is told "already running" and
/// never reaches the resolver.
#[tokio::test]
async fn scenario_concurrent_same_user_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(HandleCache::load(dir.path().join("cache.json")));
    let messenger = Arc::new(RecordingMessenger::default());
    let task_manager = Arc::new(TaskManager::new());

    let driver = GenericDriver {
        rate_limiter: Arc::new(RateLimiter::new(0.0)),
        task_manager: task_manager.clone(),
        cache,
        usage: Arc::new(UsageRecorder::load(dir.path().join("usage.json"))),
        messenger: messenger.clone(),
        blob_uploader: None,
        config: test_config(dir.path()),
    };

    let _guard = TaskGuard::acquire(&task_manager, 7).unwrap();

    let resolver = ScriptedResolver { peek: (String::new(), String::new()), parse_result: ParseResult::failure("unused") };
    driver.handle(req(7, "https://a.example/1"), &resolver).await.unwrap();

    let calls = messenger.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], Call::SendText(t) if t.contains("already running")));
}

/// A stale `send_by_handle` evicts the cache entry exactly once and falls
/// through to a full `parse()`.
#[tokio::test]
async fn stale_cache_handle_is_evicted_then_reresolved() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(HandleCache::load(dir.path().join("cache.json")));
    cache.put("v1", HandleCacheEntry::simple("Old", "FH_stale")).unwrap();

    let messenger = Arc::new(RecordingMessenger::default());
    *messenger.send_by_handle_err.lock().unwrap() = Some(TransportError::StaleReference("file reference expired".to_string()));
    let driver = build_driver(dir.path(), messenger.clone(), cache.clone(), None);

    let parse_result = ParseResult {
        success: true,
        content_type: ContentType::Video,
        media_items: vec![MediaItem::video("/t/fresh.mp4")],
        title: "Fresh".to_string(),
        vid: "v1".to_string(),
        size_mb: 5.0,
        ..ParseResult::failure("unused")
    };
    let resolver = ScriptedResolver { peek: ("v1".to_string(), "Old".to_string()), parse_result };

    driver.handle(req(1, "https://a.example/1"), &resolver).await.unwrap();

    // Stale handle replaced by a freshly delivered one.
    assert_eq!(cache.get("v1"), Some("FH_video".to_string()));
    assert!(messenger.calls().iter().any(|c| matches!(c, Call::SendVideo { .. })));
}

/// Every admitted request appends exactly one usage record, on both success
/// and failure.
#[tokio::test]
async fn usage_record_appended_on_both_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(HandleCache::load(dir.path().join("cache.json")));
    let messenger = Arc::new(RecordingMessenger::default());
    let usage = Arc::new(UsageRecorder::load(dir.path().join("usage.json")));

    let driver = GenericDriver {
        rate_limiter: Arc::new(RateLimiter::new(0.0)),
        task_manager: Arc::new(TaskManager::new()),
        cache,
        usage: usage.clone(),
        messenger: messenger.clone(),
        blob_uploader: None,
        config: test_config(dir.path()),
    };

    let failing = ScriptedResolver { peek: (String::new(), String::new()), parse_result: ParseResult::failure("boom") };
    let _ = driver.handle(req(9, "https://a.example/fail"), &failing).await;
    assert_eq!(usage.records_for(9).len(), 1);

    let succeeding = ScriptedResolver {
        peek: (String::new(), String::new()),
        parse_result: ParseResult {
            success: true,
            content_type: ContentType::Audio,
            media_items: vec![MediaItem::audio("/t/a.mp3")],
            title: "Song".to_string(),
            vid: "s1".to_string(),
            size_mb: 3.0,
            ..ParseResult::failure("unused")
        },
    };
    driver.handle(req(9, "https://a.example/ok"), &succeeding).await.unwrap();
    assert_eq!(usage.records_for(9).len(), 2);
}
