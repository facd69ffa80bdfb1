use async_trait::async_trait;

use super::snapshot::ProgressSnapshot;

/// Trait for anything that wants to observe download progress.
///
/// `run_progress_monitor` calls these methods on the registered observer
/// after aggregating raw byte counts into a `ProgressSnapshot`.
///
/// - `on_progress` is called for every progress event (per-segment granularity).
/// - `on_complete` is called once when the download finishes successfully.
/// - `on_error` is called once when the download fails.
#[async_trait]
pub trait ProgressObserver: Send + Sync + 'static {
    async fn on_progress(&self, snapshot: &ProgressSnapshot);
    async fn on_complete(&self, snapshot: &ProgressSnapshot);
    async fn on_error(&self, error: &str);
}
