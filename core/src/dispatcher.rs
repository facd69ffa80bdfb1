//! `Dispatcher` (§4.5 C10): the single message handler sitting in front of
//! `GenericDriver` — URL-pattern routing, blacklist gating, the cosmetic
//! original-message delete, and the admin status line.

use std::sync::Arc;
use std::time::Instant;

use crate::blacklist::Blacklist;
use crate::driver::{GenericDriver, RequestInfo};
use crate::ports::Messenger;
use crate::resolver::{bilibili::BilibiliResolver, douyin::DouyinResolver, fallback::FallbackResolver, music::MusicResolver, tiktok::TikTokResolver, xhs::XhsResolver, Resolver};
use crate::types::ParseMode;

/// One inbound chat message carrying a URL to resolve.
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub uid: i64,
    pub uname: String,
    pub full_name: String,
    pub text: String,
}

pub struct Dispatcher {
    pub blacklist: Arc<Blacklist>,
    pub driver: Arc<GenericDriver>,
    pub messenger: Arc<dyn Messenger>,
    pub admin_id: i64,
    pub douyin: Arc<DouyinResolver>,
    pub tiktok: Arc<TikTokResolver>,
    pub bilibili: Arc<BilibiliResolver>,
    pub music: Arc<MusicResolver>,
    pub xhs: Arc<XhsResolver>,
    pub fallback: Arc<FallbackResolver>,
}

impl Dispatcher {
    /// First-match-wins platform routing (§4.5). Order matters: `b23.tv` must
    /// be checked before the generic tiktok short-link prefixes, etc.
    fn pick_resolver(&self, text: &str) -> Arc<dyn Resolver> {
        if text.contains("bilibili.com") || text.contains("b23.tv/") {
            self.bilibili.clone() as Arc<dyn Resolver>
        } else if text.contains("v.douyin.com") {
            self.douyin.clone() as Arc<dyn Resolver>
        } else if text.contains("music.163.com") || text.contains("163cn.tv") {
            self.music.clone() as Arc<dyn Resolver>
        } else if text.contains("xiaohongshu.com") || text.contains("xhslink.com/") {
            self.xhs.clone() as Arc<dyn Resolver>
        } else if text.contains("vm.tiktok.com") || text.contains("vt.tiktok.com") || text.contains("www.tiktok.com") {
            self.tiktok.clone() as Arc<dyn Resolver>
        } else {
            self.fallback.clone() as Arc<dyn Resolver>
        }
    }

    pub async fn dispatch(&self, msg: IncomingMessage) {
        if self.blacklist.contains(msg.uid) {
            return;
        }

        let resolver = self.pick_resolver(&msg.text);
        let platform = resolver.platform_name().to_string();
        let is_admin = msg.uid == self.admin_id;
        let start = Instant::now();

        let req = RequestInfo {
            chat_id: msg.chat_id,
            uid: msg.uid,
            uname: msg.uname.clone(),
            full_name: msg.full_name.clone(),
            input_text: msg.text.clone(),
            url: msg.text.clone(),
            platform: platform.clone(),
        };

        let outcome = self.driver.handle(req, resolver.as_ref()).await;
        let success = outcome.is_ok();

        if success {
            let _ = self.messenger.delete_message(msg.chat_id, msg.message_id).await;
        }

        if !is_admin {
            self.emit_status_line(&platform, start.elapsed().as_secs_f64(), success, &msg.text).await;
        }
    }

    async fn emit_status_line(&self, platform: &str, elapsed_secs: f64, success: bool, input_text: &str) {
        if self.admin_id == 0 {
            return;
        }
        let glyph = if success { "\u{2713}" } else { "\u{2717}" };
        let snippet: String = input_text.chars().take(60).collect();
        let line = format!("{glyph} {platform} {elapsed_secs:.2}s — {snippet}");
        let _ = self.messenger.send_text(self.admin_id, &line, ParseMode::Plain, None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_name_for(text: &str) -> &'static str {
        if text.contains("bilibili.com") || text.contains("b23.tv/") {
            "bilibili"
        } else if text.contains("v.douyin.com") {
            "douyin"
        } else if text.contains("music.163.com") || text.contains("163cn.tv") {
            "music"
        } else if text.contains("xiaohongshu.com") || text.contains("xhslink.com/") {
            "xhs"
        } else if text.contains("vm.tiktok.com") || text.contains("vt.tiktok.com") || text.contains("www.tiktok.com") {
            "tiktok"
        } else {
            "unknown"
        }
    }

    #[test]
    fn bilibili_pattern_wins_over_generic_text() {
        assert_eq!(resolver_name_for("check this https://www.bilibili.com/video/BV1xx"), "bilibili");
    }

    #[test]
    fn unrecognized_url_falls_back() {
        assert_eq!(resolver_name_for("https://example.com/post/1"), "unknown");
    }

    #[test]
    fn xhs_short_link_is_recognized() {
        assert_eq!(resolver_name_for("https://xhslink.com/abc123"), "xhs");
    }
}
