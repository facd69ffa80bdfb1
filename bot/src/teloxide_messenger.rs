//! [`Messenger`] adapter over `teloxide::Bot` — the only place this binary
//! crate talks to the Telegram Bot API directly.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia as TgInputMedia, InputMediaPhoto, InputMediaVideo, ParseMode as TgParseMode};

use clipcore::caption::MEDIA_GROUP_CHUNK_SIZE;
use clipcore::error::TransportError;
use clipcore::ports::{InputMedia, Messenger};
use clipcore::types::{split_gallery_tag, FileHandle, FileType, ParseMode, ReplyMarkup};

pub struct TeloxideMessenger {
    bot: Bot,
}

impl TeloxideMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn to_tg_parse_mode(mode: ParseMode) -> Option<TgParseMode> {
    match mode {
        ParseMode::Plain => None,
        ParseMode::Html => Some(TgParseMode::Html),
        ParseMode::MarkdownV2 => Some(TgParseMode::MarkdownV2),
    }
}

fn to_tg_keyboard(markup: &ReplyMarkup) -> teloxide::types::InlineKeyboardMarkup {
    let rows = markup
        .iter()
        .map(|row| {
            row.iter()
                .map(|(label, url)| match url.parse() {
                    Ok(url) => teloxide::types::InlineKeyboardButton::url(label.clone(), url),
                    Err(_) => teloxide::types::InlineKeyboardButton::callback(label.clone(), "noop"),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    teloxide::types::InlineKeyboardMarkup::new(rows)
}

fn map_send_err(e: teloxide::RequestError) -> TransportError {
    let text = e.to_string();
    if text.contains("file reference") || text.contains("FILE_REFERENCE") || text.contains("wrong file identifier") {
        TransportError::StaleReference(text)
    } else {
        TransportError::Send(text)
    }
}

#[async_trait]
impl Messenger for TeloxideMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<i64, TransportError> {
        let mut req = self.bot.send_message(ChatId(chat_id), text);
        req.parse_mode = to_tg_parse_mode(parse_mode);
        if let Some(markup) = reply_markup {
            req.reply_markup = Some(teloxide::types::ReplyMarkup::InlineKeyboard(to_tg_keyboard(markup)));
        }
        let message = req.await.map_err(map_send_err)?;
        Ok(message.id.0 as i64)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), TransportError> {
        self.bot
            .edit_message_text(ChatId(chat_id), teloxide::types::MessageId(message_id as i32), text)
            .await
            .map_err(map_send_err)?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        self.bot
            .delete_message(ChatId(chat_id), teloxide::types::MessageId(message_id as i32))
            .await
            .map_err(map_send_err)?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        local_path: &str,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<String, TransportError> {
        let mut req = self.bot.send_document(ChatId(chat_id), InputFile::file(local_path));
        req.caption = caption.map(str::to_string);
        req.parse_mode = to_tg_parse_mode(parse_mode);
        if let Some(markup) = reply_markup {
            req.reply_markup = Some(teloxide::types::ReplyMarkup::InlineKeyboard(to_tg_keyboard(markup)));
        }
        let message = req.await.map_err(map_send_err)?;
        message
            .document()
            .map(|d| d.file.id.to_string())
            .ok_or_else(|| TransportError::Send("response carried no document handle".to_string()))
    }

    async fn send_video(
        &self,
        chat_id: i64,
        local_path: &str,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<String, TransportError> {
        let mut req = self.bot.send_video(ChatId(chat_id), InputFile::file(local_path));
        req.caption = caption.map(str::to_string);
        req.parse_mode = to_tg_parse_mode(parse_mode);
        if let Some(markup) = reply_markup {
            req.reply_markup = Some(teloxide::types::ReplyMarkup::InlineKeyboard(to_tg_keyboard(markup)));
        }
        let message = req.await.map_err(map_send_err)?;
        message
            .video()
            .map(|v| v.file.id.to_string())
            .ok_or_else(|| TransportError::Send("response carried no video handle".to_string()))
    }

    async fn send_audio(&self, chat_id: i64, local_path: &str, caption: Option<&str>) -> Result<String, TransportError> {
        let mut req = self.bot.send_audio(ChatId(chat_id), InputFile::file(local_path));
        req.caption = caption.map(str::to_string);
        let message = req.await.map_err(map_send_err)?;
        message
            .audio()
            .map(|a| a.file.id.to_string())
            .ok_or_else(|| TransportError::Send("response carried no audio handle".to_string()))
    }

    async fn send_media_group(&self, chat_id: i64, items: &[InputMedia]) -> Result<Vec<String>, TransportError> {
        let media: Vec<TgInputMedia> = items
            .iter()
            .map(|item| {
                let file = InputFile::file(&item.local_path);
                if item.is_video {
                    let mut m = InputMediaVideo::new(file);
                    m.caption = item.caption.clone();
                    TgInputMedia::Video(m)
                } else {
                    let mut m = InputMediaPhoto::new(file);
                    m.caption = item.caption.clone();
                    TgInputMedia::Photo(m)
                }
            })
            .collect();

        let messages = self.bot.send_media_group(ChatId(chat_id), media).await.map_err(map_send_err)?;
        Ok(messages
            .iter()
            .filter_map(|m| m.video().map(|v| v.file.id.to_string()).or_else(|| m.photo().and_then(|p| p.last()).map(|p| p.file.id.to_string())))
            .collect())
    }

    async fn send_by_handle(
        &self,
        chat_id: i64,
        handle: &FileHandle,
        special: Option<&str>,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), TransportError> {
        match special {
            Some("document") => {
                let raw = single_handle(handle);
                self.resend_document(chat_id, raw, caption, parse_mode, reply_markup).await
            }
            Some("gallery") => self.resend_gallery(chat_id, handle, caption).await,
            Some("video") | None => {
                let raw = single_handle(handle);
                self.resend_video(chat_id, raw, caption, parse_mode, reply_markup).await
            }
            // Anything else ("link", or an upload host name like "catbox")
            // means `file_id` is an externally-hosted URL, not a remote handle.
            Some(_) => {
                let url = single_handle(handle);
                self.resend_link(chat_id, url, caption, reply_markup).await
            }
        }
    }

    async fn chat_action(&self, chat_id: i64, action: &str) {
        let action = match action {
            "upload_video" => teloxide::types::ChatAction::UploadVideo,
            "upload_document" => teloxide::types::ChatAction::UploadDocument,
            "find_location" => teloxide::types::ChatAction::FindLocation,
            _ => teloxide::types::ChatAction::Typing,
        };
        let _ = self.bot.send_chat_action(ChatId(chat_id), action).await;
    }
}

/// Single-handle cache replay only ever deals with one remote handle; `Many`
/// only appears for `special == "gallery"`, handled separately.
fn single_handle(handle: &FileHandle) -> &str {
    match handle {
        FileHandle::Single(s) => s,
        FileHandle::Many(v) => v.first().map(String::as_str).unwrap_or_default(),
    }
}

impl TeloxideMessenger {
    async fn resend_video(
        &self,
        chat_id: i64,
        handle: &str,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), TransportError> {
        let mut req = self.bot.send_video(ChatId(chat_id), InputFile::file_id(handle));
        req.caption = caption.map(str::to_string);
        req.parse_mode = to_tg_parse_mode(parse_mode);
        if let Some(markup) = reply_markup {
            req.reply_markup = Some(teloxide::types::ReplyMarkup::InlineKeyboard(to_tg_keyboard(markup)));
        }
        req.await.map_err(map_send_err)?;
        Ok(())
    }

    async fn resend_document(
        &self,
        chat_id: i64,
        handle: &str,
        caption: Option<&str>,
        parse_mode: ParseMode,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), TransportError> {
        let mut req = self.bot.send_document(ChatId(chat_id), InputFile::file_id(handle));
        req.caption = caption.map(str::to_string);
        req.parse_mode = to_tg_parse_mode(parse_mode);
        if let Some(markup) = reply_markup {
            req.reply_markup = Some(teloxide::types::ReplyMarkup::InlineKeyboard(to_tg_keyboard(markup)));
        }
        req.await.map_err(map_send_err)?;
        Ok(())
    }

    /// Render a hosted URL (`special` not a native-handle tag) as a text
    /// message, the same shape `deliver_plain`'s oversize branch sends live.
    async fn resend_link(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), TransportError> {
        let text = match caption.filter(|c| !c.is_empty()) {
            Some(caption) => format!("{caption}\n<a href=\"{url}\">download</a>"),
            None => format!("<a href=\"{url}\">download</a>"),
        };
        let mut req = self.bot.send_message(ChatId(chat_id), text);
        req.parse_mode = Some(TgParseMode::Html);
        if let Some(markup) = reply_markup {
            req.reply_markup = Some(teloxide::types::ReplyMarkup::InlineKeyboard(to_tg_keyboard(markup)));
        }
        req.await.map_err(map_send_err)?;
        Ok(())
    }

    /// Resend every item of a cached gallery as one album, decoding each
    /// item's `VIDEO:`/`IMAGE:` tag back into its native Telegram media kind.
    async fn resend_gallery(&self, chat_id: i64, handle: &FileHandle, caption: Option<&str>) -> Result<(), TransportError> {
        let FileHandle::Many(items) = handle else {
            return self.resend_video(chat_id, single_handle(handle), caption, ParseMode::Html, None).await;
        };
        if items.is_empty() {
            return Ok(());
        }

        for (chunk_index, chunk) in items.chunks(MEDIA_GROUP_CHUNK_SIZE).enumerate() {
            let media: Vec<TgInputMedia> = chunk
                .iter()
                .enumerate()
                .map(|(i, raw)| {
                    let (file_type, file_id) = split_gallery_tag(raw);
                    let file = InputFile::file_id(file_id);
                    let item_caption = (chunk_index == 0 && i == 0).then(|| caption.map(str::to_string)).flatten();
                    if file_type == FileType::Video {
                        let mut m = InputMediaVideo::new(file);
                        m.caption = item_caption;
                        TgInputMedia::Video(m)
                    } else {
                        let mut m = InputMediaPhoto::new(file);
                        m.caption = item_caption;
                        TgInputMedia::Photo(m)
                    }
                })
                .collect();
            self.bot.send_media_group(ChatId(chat_id), media).await.map_err(map_send_err)?;
        }
        Ok(())
    }
}
