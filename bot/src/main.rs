mod blob_uploader;
mod browser_pool;
mod commands;
mod teloxide_messenger;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use clipcore::dispatcher::IncomingMessage;
use clipcore::resolver::bilibili::BilibiliResolver;
use clipcore::resolver::douyin::DouyinResolver;
use clipcore::resolver::fallback::{FallbackResolver, USAGE_HELP};
use clipcore::resolver::music::MusicResolver;
use clipcore::resolver::tiktok::TikTokResolver;
use clipcore::resolver::xhs::XhsResolver;
use clipcore::resolver::ResolverContext;
use clipcore::ports::Messenger;
use clipcore::types::ParseMode;
use clipcore::{Blacklist, Config, Downloader, GenericDriver, HandleCache, RateLimiter, TaskManager, UsageRecorder};
use clipcore::Dispatcher as ClipDispatcher;

use blob_uploader::CatboxUploader;
use commands::{handle_admin_command, AdminCommand, AdminState};
use teloxide_messenger::TeloxideMessenger;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env().expect("startup requires TELEGRAM_TOKEN");

    let persist_root = config.download_root.join("state");
    std::fs::create_dir_all(&persist_root).expect("failed to create persistent state directory");
    let cache = Arc::new(HandleCache::load(persist_root.join("handle_cache.json")));
    let blacklist = Arc::new(Blacklist::load(persist_root.join("blacklist.json")));
    let usage = Arc::new(UsageRecorder::load(persist_root.join("user_stats.json")));
    let rate_limiter = Arc::new(RateLimiter::new(config.min_msg_interval_secs));
    let task_manager = Arc::new(TaskManager::new());

    let bot = Bot::new(config.telegram_token.clone());
    let messenger = Arc::new(TeloxideMessenger::new(bot.clone()));

    let http = reqwest::Client::new();
    let downloader = Arc::new(Downloader::new(config.max_thread_workers));
    let blob_uploader = Arc::new(CatboxUploader::new(http.clone(), "https://catbox.moe/user/api.php"));

    let driver = Arc::new(GenericDriver {
        rate_limiter: rate_limiter.clone(),
        task_manager: task_manager.clone(),
        cache: cache.clone(),
        usage: usage.clone(),
        messenger: messenger.clone(),
        blob_uploader: Some(blob_uploader.clone()),
        config: config.clone(),
    });

    let resolver_ctx = |platform: &str| ResolverContext {
        http: http.clone(),
        downloader: downloader.clone(),
        browser_pool: None,
        sessdata: config.sessdata.clone(),
        web_session: config.web_session.clone(),
        save_dir: config.platform_dir(platform),
    };

    let dispatcher = Arc::new(ClipDispatcher {
        blacklist: blacklist.clone(),
        driver: driver.clone(),
        messenger: messenger.clone(),
        admin_id: config.admin_id,
        douyin: Arc::new(DouyinResolver::new(resolver_ctx("douyin"))),
        tiktok: Arc::new(TikTokResolver::new(resolver_ctx("tiktok"))),
        bilibili: Arc::new(BilibiliResolver::new(resolver_ctx("bilibili"), Some(blob_uploader.clone()))),
        music: Arc::new(MusicResolver::new(resolver_ctx("music"))),
        xhs: Arc::new(XhsResolver::new(resolver_ctx("xhs"))),
        fallback: Arc::new(FallbackResolver),
    });

    let admin_state = Arc::new(AdminState {
        cache: cache.clone(),
        blacklist: blacklist.clone(),
        usage: usage.clone(),
        task_manager: task_manager.clone(),
        messenger: messenger.clone(),
    });

    log::info!("[bot] starting long-poll loop");

    let admin_id = config.admin_id;
    let messenger_for_handler = messenger.clone();
    let handler = Update::filter_message().branch(
        dptree::filter(move |msg: Message| msg.from.as_ref().map(|u| u.id.0 as i64) == Some(admin_id) && msg.text().map(|t| t.starts_with('/')).unwrap_or(false))
            .endpoint(move |bot: Bot, msg: Message| {
                let admin_state = admin_state.clone();
                async move {
                    if let Some(text) = msg.text() {
                        if let Ok(cmd) = AdminCommand::parse(text, "clip-relay-bot") {
                            handle_admin_command(bot, msg.chat.id, cmd, &admin_state).await?;
                        }
                    }
                    respond(())
                }
            }),
    )
    .branch(dptree::endpoint(move |msg: Message| {
        let dispatcher = dispatcher.clone();
        let messenger = messenger_for_handler.clone();
        async move {
            if let Some(text) = msg.text() {
                if text.trim() == "/start" {
                    let _ = messenger.send_text(msg.chat.id.0, USAGE_HELP, ParseMode::Plain, None).await;
                    return respond(());
                }
                let from = msg.from.as_ref();
                let incoming = IncomingMessage {
                    chat_id: msg.chat.id.0,
                    message_id: msg.id.0 as i64,
                    uid: from.map(|u| u.id.0 as i64).unwrap_or(0),
                    uname: from.and_then(|u| u.username.clone()).unwrap_or_default(),
                    full_name: from.map(|u| u.full_name()).unwrap_or_default(),
                    text: text.to_string(),
                };
                dispatcher.dispatch(incoming).await;
            }
            respond(())
        }
    }));

    if let Err(e) = messenger.send_text(admin_id, "clip-relay-bot online", ParseMode::Plain, None).await {
        log::warn!("[bot] startup notification to admin failed: {e}");
    }

    Dispatcher::builder(bot, handler).build().dispatch().await;
}
