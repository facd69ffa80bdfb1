//! Layered configuration (§6, §10.3), read from environment variables the way
//! the original `TelegramBot/config.py` reads from `.env` — the `bot` binary
//! loads a `.env` file with `dotenvy` before calling [`Config::from_env`].

use std::env;
use std::path::PathBuf;

/// `(timeout_seconds, retries)` pair, e.g. video peek/parse timeouts in §4.4.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutRetry {
    pub timeout_secs: u64,
    pub retries: u32,
}

impl TimeoutRetry {
    pub const fn new(timeout_secs: u64, retries: u32) -> Self {
        Self { timeout_secs, retries }
    }
}

/// Per-platform resolver timeouts, grouped the way `config.py`'s
/// `DOUYIN_PARSE_VIDEO_TIMEOUT` / `DOUYIN_FETCH_VIDEO_TIMEOUT` pairs are.
#[derive(Debug, Clone, Copy)]
pub struct PlatformTimeouts {
    pub peek: TimeoutRetry,
    pub parse: TimeoutRetry,
}

impl Default for PlatformTimeouts {
    fn default() -> Self {
        Self {
            peek: TimeoutRetry::new(10, 2),
            parse: TimeoutRetry::new(30, 3),
        }
    }
}

/// Delivery-send timeouts (§4.4 "Retries").
#[derive(Debug, Clone, Copy)]
pub struct SendTimeouts {
    pub text: TimeoutRetry,
    pub video: TimeoutRetry,
    pub media_group: TimeoutRetry,
    pub upload: TimeoutRetry,
}

impl Default for SendTimeouts {
    fn default() -> Self {
        Self {
            text: TimeoutRetry::new(10, 2),
            video: TimeoutRetry::new(60, 2),
            media_group: TimeoutRetry::new(20, 2),
            upload: TimeoutRetry::new(35, 2),
        }
    }
}

/// Process-wide configuration. Constructed once at startup; cheap to clone
/// and pass down into the driver/dispatcher.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub admin_id: i64,
    pub min_msg_interval_secs: f64,
    pub max_thread_workers: usize,
    /// §4.4 "Image-gallery cache switch" — default `false` (documented in §9
    /// Open Questions: ephemeral CDN URLs make gallery replay unsafe by default).
    pub images_cache_switch: bool,
    pub sessdata: Option<String>,
    pub web_session: Option<String>,
    pub download_root: PathBuf,
    pub less_flag: Option<String>,
    pub oversize_threshold_mb: f64,
    pub platform_timeouts: PlatformTimeouts,
    pub send_timeouts: SendTimeouts,
}

/// The one documented startup failure (§6): missing transport token.
#[derive(Debug, thiserror::Error)]
#[error("TELEGRAM_TOKEN environment variable is not set")]
pub struct MissingTokenError;

impl Config {
    /// Build configuration from the process environment. Everything besides
    /// `TELEGRAM_TOKEN` has a documented default, matching `config.py`.
    pub fn from_env() -> Result<Self, MissingTokenError> {
        let telegram_token = env::var("TELEGRAM_TOKEN").map_err(|_| MissingTokenError)?;
        if telegram_token.is_empty() {
            return Err(MissingTokenError);
        }

        let admin_id = env::var("ADMIN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let min_msg_interval_secs = env::var("MIN_MSG_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3.0);

        let max_thread_workers = env::var("MAX_THREAD_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let images_cache_switch = env::var("IMAGES_CACHE_SWITCH")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let sessdata = env::var("SESSDATA").ok().filter(|s| !s.is_empty());
        let web_session = env::var("WEB_SESSION").ok().filter(|s| !s.is_empty());

        let download_root = env::var("DOWNLOAD_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default().join("downloads"));

        let less_flag = env::var("LESS_FLAG").ok().filter(|s| !s.is_empty());

        let oversize_threshold_mb = env::var("OVERSIZE_THRESHOLD_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50.0);

        Ok(Self {
            telegram_token,
            admin_id,
            min_msg_interval_secs,
            max_thread_workers,
            images_cache_switch,
            sessdata,
            web_session,
            download_root,
            less_flag,
            oversize_threshold_mb,
            platform_timeouts: PlatformTimeouts::default(),
            send_timeouts: SendTimeouts::default(),
        })
    }

    /// Per-platform download directory, created lazily (mirrors `config.py`'s
    /// `DOUYIN_SAVE_DIR` / `BILI_SAVE_DIR` / ... directory-per-platform layout).
    pub fn platform_dir(&self, platform: &str) -> PathBuf {
        let dir = self.download_root.join(platform);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            log::warn!("[config] could not create platform dir {:?}: {}", dir, e);
        }
        dir
    }
}

