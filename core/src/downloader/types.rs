//! Segment bookkeeping types, grounded on the teacher's `Piece`/`SegmentState`
//! (renamed `Segment` to match `segment_grabber.rs`'s own naming, which had
//! already moved on from "piece").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentState {
    NotStarted,
    Downloading,
    Finished,
    Failed,
}

/// A contiguous byte range of the target file. `length == -1` means
/// "unknown, download everything the server sends" (non-resumable case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub offset: i64,
    pub length: i64,
    pub downloaded: i64,
    pub state: SegmentState,
}

impl Segment {
    pub fn new(id: String, offset: i64, length: i64) -> Self {
        Self {
            id,
            offset,
            length,
            downloaded: 0,
            state: SegmentState::NotStarted,
        }
    }
}

/// Per-request headers/cookies/auth carried through redirect chase and every
/// segment worker (§4.2 contract parameters).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub headers: HashMap<String, Vec<String>>,
    pub cookies: Option<String>,
}

/// `download()` contract parameters (§4.2), beyond `url`/`dest_path`.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub timeout_secs: u64,
    pub max_redirects: u32,
    /// Short-circuits the redirect chase when this substring appears in `Location`.
    pub return_flag: Option<String>,
    /// Use `GET` instead of `HEAD` for platforms that 403 HEAD requests.
    pub use_get: bool,
    /// Return the last URL even on a non-2xx pre-check response.
    pub return_filed_url: bool,
    pub multi_session: bool,
    pub pool_size: Option<usize>,
    pub max_retries: u32,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_redirects: 10,
            return_flag: None,
            use_get: false,
            return_filed_url: false,
            multi_session: false,
            pool_size: None,
            max_retries: 3,
        }
    }
}

/// Outcome of the redirect chase + pre-check phase.
#[derive(Debug, Clone)]
pub struct PreCheck {
    pub final_url: String,
    pub content_length: Option<u64>,
    pub accepts_ranges: bool,
    pub status_is_success: bool,
}
