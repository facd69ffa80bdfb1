//! Error taxonomy (§7). Subsystems raise their own `thiserror` enums;
//! [`ErrorKind`] is the cross-cutting classification the driver uses to
//! decide user-visible behavior without matching on subsystem internals.

use thiserror::Error;

/// Download/segmentation failures. Extends the teacher's `DownloadError`
/// with the redirect-chase and assembly failure modes §4.2 requires.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),
    #[error("redirect loop at {0}")]
    RedirectLoop(String),
    #[error("too many redirects (max {0})")]
    TooManyRedirects(usize),
    #[error("max retry exceeded")]
    MaxRetryExceeded,
    #[error("cancelled")]
    Cancelled,
    #[error("segment failed: {0}")]
    SegmentFailed(String),
    #[error("download deadline exceeded")]
    DeadlineExceeded,
}

/// Handle-cache / usage-recorder / blacklist persistence failures.
/// Per §4.1 and §4.7, these are always logged, never propagated to the pipeline —
/// callers see `Result` only at the point a *read* needs valid data.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),
}

/// Resolver-internal failures. A `Resolver::parse`/`peek` implementation maps
/// these into `ParseResult::failure`/`Err` at its own boundary — they never
/// escape into the driver as a panic or unhandled exception (§7 propagation policy).
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),
    #[error("upstream request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("browser automation failed: {0}")]
    Browser(String),
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),
    #[error("timed out")]
    Timeout,
}

/// Messenger/transport send-or-edit failures, after the driver's own retry wrapper
/// has exhausted its attempts.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("stale file reference: {0}")]
    StaleReference(String),
    #[error("timed out")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}

impl From<tokio::time::error::Elapsed> for ResolverError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ResolverError::Timeout
    }
}

impl TransportError {
    /// True when the transport rejected a cached handle as gone/expired (§7 `CacheStaleError`).
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, TransportError::StaleReference(_))
    }
}

/// The top-level failure of one `GenericDriver` run, carrying enough to pick
/// the right user-visible reply and `UsageRecord::parse_exception`.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid or unsupported input")]
    UserInput(String),
    #[error("platform unavailable: {0}")]
    PlatformUnavailable(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ResolverError> for DriverError {
    fn from(e: ResolverError) -> Self {
        match e {
            ResolverError::UnsupportedUrl(u) => DriverError::UserInput(u),
            other => DriverError::PlatformUnavailable(other.to_string()),
        }
    }
}

/// Kind classification from §7, used purely for logging/metrics grouping —
/// the user-visible text is chosen directly off `DriverError`'s variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInputError,
    PlatformUnavailable,
    QuotaOrSizeError,
    TransportError,
    CacheStaleError,
    InternalError,
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::UserInput(_) => ErrorKind::UserInputError,
            DriverError::PlatformUnavailable(_) => ErrorKind::PlatformUnavailable,
            DriverError::Transport(t) if t.is_stale_reference() => ErrorKind::CacheStaleError,
            DriverError::Transport(_) => ErrorKind::TransportError,
            DriverError::Internal(_) => ErrorKind::InternalError,
        }
    }
}
