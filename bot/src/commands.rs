//! Admin command handlers (§6). Thin by design — line 17 of the
//! specification scopes these to "effect on core state only"; there is no
//! rich admin UI here, just the state mutation each command names.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::command::BotCommands;

use clipcore::ports::Messenger;
use clipcore::{Blacklist, HandleCache, TaskManager, UsageRecorder};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case")]
pub enum AdminCommand {
    Getcache(String),
    Delcache(String),
    Showcache(String),
    BlacklistAdd(String),
    BlacklistRemove(String),
    BlacklistShow,
    Notify(String),
    Status,
}

pub struct AdminState {
    pub cache: Arc<HandleCache>,
    pub blacklist: Arc<Blacklist>,
    pub usage: Arc<UsageRecorder>,
    pub task_manager: Arc<TaskManager>,
    pub messenger: Arc<dyn Messenger>,
}

/// Resolve a `/blacklist_add`/`/blacklist_remove` argument that may be a
/// numeric uid or an `@username` looked up against known usage records.
fn resolve_uid(state: &AdminState, token: &str) -> Option<i64> {
    if let Ok(uid) = token.parse::<i64>() {
        return Some(uid);
    }
    let handle = token.trim_start_matches('@');
    state
        .usage
        .known_users()
        .into_iter()
        .find(|(_, uname, _)| uname == handle)
        .map(|(uid, _, _)| uid)
}

pub async fn handle_admin_command(bot: Bot, chat_id: ChatId, cmd: AdminCommand, state: &AdminState) -> ResponseResult<()> {
    match cmd {
        AdminCommand::Getcache(vid) => {
            match state.cache.get_full(&vid) {
                Some(entry) => {
                    let caption = (!entry.title.is_empty()).then(|| entry.title.clone());
                    if let Err(e) = state
                        .messenger
                        .send_by_handle(
                            chat_id.0,
                            &entry.file_id,
                            entry.special.as_deref(),
                            caption.as_deref(),
                            entry.parse_mode,
                            entry.reply.as_ref(),
                        )
                        .await
                    {
                        bot.send_message(chat_id, format!("replay failed: {e}")).await?;
                    }
                }
                None => {
                    bot.send_message(chat_id, format!("no cache entry for vid={vid}")).await?;
                }
            }
        }
        AdminCommand::Delcache(vid) => {
            let removed = state.cache.delete(&vid).unwrap_or(false);
            let text = if removed { format!("removed {vid}") } else { format!("no such entry: {vid}") };
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::Showcache(n_arg) => {
            let n: i64 = n_arg.trim().parse().unwrap_or(20);
            let mut pairs = state.cache.title_pairs();
            if n < 0 {
                let take = (-n) as usize;
                pairs = pairs.into_iter().rev().take(take).collect();
            } else {
                pairs.truncate(n as usize);
            }
            let text = if pairs.is_empty() {
                "cache is empty".to_string()
            } else {
                pairs
                    .into_iter()
                    .map(|(vid, title)| format!("{vid} — {title}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::BlacklistAdd(arg) => {
            let text = match resolve_uid(state, &arg) {
                Some(uid) => match state.blacklist.add(uid) {
                    Ok(true) => format!("blacklisted {uid}"),
                    Ok(false) => format!("{uid} already blacklisted"),
                    Err(e) => format!("failed: {e}"),
                },
                None => format!("could not resolve {arg}"),
            };
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::BlacklistRemove(arg) => {
            let text = match resolve_uid(state, &arg) {
                Some(uid) => match state.blacklist.remove(uid) {
                    Ok(true) => format!("unblocked {uid}"),
                    Ok(false) => format!("{uid} was not blacklisted"),
                    Err(e) => format!("failed: {e}"),
                },
                None => format!("could not resolve {arg}"),
            };
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::BlacklistShow => {
            let ids = state.blacklist.list();
            let text = if ids.is_empty() {
                "blacklist is empty".to_string()
            } else {
                ids.into_iter().map(|u| u.to_string()).collect::<Vec<_>>().join(", ")
            };
            bot.send_message(chat_id, text).await?;
        }
        AdminCommand::Notify(arg) => {
            let (targets, text) = match arg.split_once(' ') {
                Some((t, rest)) => (t.to_string(), rest.to_string()),
                None => (arg, String::new()),
            };
            let keyboard = InlineKeyboardMarkup::new(vec![vec![
                InlineKeyboardButton::callback("Yes", format!("notify_yes:{targets}")),
                InlineKeyboardButton::callback("No", "notify_no".to_string()),
            ]]);
            bot.send_message(chat_id, format!("broadcast to {targets}: {text}\nconfirm?"))
                .reply_markup(keyboard)
                .await?;
        }
        AdminCommand::Status => {
            let (cpu_pct, rss_pct) = self_usage().unwrap_or((0.0, 0.0));
            let text = format!(
                "cpu={cpu_pct:.1}% rss={rss_pct:.1}% active_tasks={}",
                state.task_manager.active_count()
            );
            bot.send_message(chat_id, text).await?;
        }
    }
    Ok(())
}

/// CPU%/RSS% for the running process, read straight from `/proc` rather
/// than pulling in a full system-inspection crate.
///
/// CPU% is averaged over the process lifetime (ticks spent in user+kernel
/// mode divided by wall-clock ticks since start); RSS% is resident pages
/// against total system memory from `/proc/meminfo`.
fn self_usage() -> Option<(f64, f64)> {
    let ticks_per_sec = 100.0; // USER_HZ; stable on Linux regardless of kernel config
    let page_size_kb = 4.0;

    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    let after_comm = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // fields[0] is state; utime/stime are the original stat fields 14/15,
    // i.e. indices 11/12 here once state+comm are stripped.
    let utime: f64 = fields.get(11)?.parse().ok()?;
    let stime: f64 = fields.get(12)?.parse().ok()?;
    let starttime: f64 = fields.get(19)?.parse().ok()?;

    let uptime_str = std::fs::read_to_string("/proc/uptime").ok()?;
    let uptime: f64 = uptime_str.split_whitespace().next()?.parse().ok()?;

    let process_seconds = uptime - starttime / ticks_per_sec;
    let cpu_pct = if process_seconds > 0.0 {
        (utime + stime) / ticks_per_sec / process_seconds * 100.0
    } else {
        0.0
    };

    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let rss_kb = rss_pages * page_size_kb;

    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let total_kb: f64 = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())?;

    let rss_pct = if total_kb > 0.0 { rss_kb / total_kb * 100.0 } else { 0.0 };

    Some((cpu_pct, rss_pct))
}
