//! The `Messenger` port: everything the driver/dispatcher need to talk back
//! to a user, independent of the concrete bot transport library (§4.6).

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{FileHandle, ParseMode, ReplyMarkup};

/// One element of a media-group send — mirrors `generic_handler.py`'s
/// `InputMediaPhoto`/`InputMediaVideo`, minus the transport-specific type tag.
#[derive(Debug, Clone)]
pub struct InputMedia {
    pub local_path: String,
    pub is_video: bool,
    pub caption: Option<String>,
}

/// Abstract chat transport. A concrete adapter (teloxide, matrix-sdk, ...)
/// implements this in the binary crate; `clipcore` depends only on the trait.
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    /// Send a plain/marked-up text message, returning its message id for
    /// later edit/delete (used for the placeholder + cosmetic cleanup, §4.4).
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<i64, TransportError>;

    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), TransportError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError>;

    /// Upload a local file as a generic document, returning the transport's
    /// remote handle (what the handle cache stores).
    async fn send_document(
        &self,
        chat_id: i64,
        local_path: &str,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<String, TransportError>;

    async fn send_video(
        &self,
        chat_id: i64,
        local_path: &str,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<String, TransportError>;

    async fn send_audio(
        &self,
        chat_id: i64,
        local_path: &str,
        caption: Option<&str>,
    ) -> Result<String, TransportError>;

    /// Send a pre-chunked (≤10 items) media group; returns one remote handle
    /// per item, in order.
    async fn send_media_group(
        &self,
        chat_id: i64,
        items: &[InputMedia],
    ) -> Result<Vec<String>, TransportError>;

    /// Resend content already known to the transport by its cached remote
    /// handle(s) — the cache-hit fast path (§4.1) and `/getcache`. `special`
    /// is the cache entry's dispatch tag (see [`crate::types::HandleCacheEntry`]):
    /// it picks video vs. document vs. link-text vs. gallery replay, and for
    /// `Many` handles every item is resent. A `TransportError::StaleReference`
    /// return tells the caller the cache entry must be evicted (§7 `CacheStaleError`).
    async fn send_by_handle(
        &self,
        chat_id: i64,
        handle: &FileHandle,
        special: Option<&str>,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), TransportError>;

    /// Best-effort "typing"/"upload_video" style presence indicator.
    async fn chat_action(&self, chat_id: i64, action: &str);
}
