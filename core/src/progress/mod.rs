pub mod observer;
pub mod snapshot;

pub use observer::ProgressObserver;
pub use snapshot::{format_bytes, ProgressSnapshot, SegmentSnapshot};

/// One raw progress tick reported by a segment's download loop.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub segment_id: String,
    pub bytes_delta: u64,
    pub total_bytes: Option<u64>,
}
