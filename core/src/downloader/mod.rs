//! Segmented HTTP downloader (§4.2). Keeps the teacher's three-phase shape
//! (pre-check → concurrent segment workers → assemble) from
//! `MultipartDownloadStrategy`, generalized to the spec's exact thresholds,
//! session-pooling policy, and single-GET fallback.

pub mod redirect;
pub mod segment;
pub mod session_pool;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::DownloadError;
use crate::progress::{ProgressObserver, ProgressSnapshot, SegmentSnapshot};

pub use redirect::chase_and_precheck;
pub use types::{DownloadOptions, PreCheck, RequestContext, Segment, SegmentState};

/// Below this, skip segmentation entirely and stream single-threaded (§4.2 pre-check).
const SMALL_FILE_THRESHOLD_BYTES: u64 = 2 * 1024 * 1024;
const PROGRESS_POLL_INTERVAL_MS: u64 = 50;

pub struct Downloader {
    client: reqwest::Client,
    threads: usize,
}

impl Downloader {
    pub fn new(threads: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            threads: threads.max(1),
        }
    }

    /// `download(url, dest_path, ...)` contract (§4.2).
    pub async fn download(
        &self,
        url: &str,
        dest_path: &Path,
        ctx: &RequestContext,
        opts: &DownloadOptions,
        observer: Option<Box<dyn ProgressObserver>>,
    ) -> Result<PathBuf, DownloadError> {
        let precheck = chase_and_precheck(&self.client, url, ctx, opts).await?;

        let small_or_unknown = precheck
            .content_length
            .map(|len| len == 0 || len < SMALL_FILE_THRESHOLD_BYTES)
            .unwrap_or(true);

        if !precheck.accepts_ranges {
            log::warn!("[downloader] {} does not advertise Accept-Ranges: bytes; attempting segmented anyway", precheck.final_url);
        }

        if small_or_unknown {
            return self.single_get(&precheck.final_url, dest_path, ctx, opts).await;
        }

        let total = precheck.content_length.unwrap();
        match self
            .segmented(&precheck.final_url, dest_path, ctx, opts, total, observer)
            .await
        {
            Ok(path) => Ok(path),
            Err(e) => {
                log::warn!("[downloader] segmented download failed ({e}), falling back to single GET");
                self.single_get(&precheck.final_url, dest_path, ctx, opts).await
            }
        }
    }

    fn make_segments(&self, total: u64) -> Vec<Segment> {
        let n = self.threads as u64;
        let base = total / n;
        let mut segments = Vec::with_capacity(self.threads);
        for i in 0..n {
            let offset = i * base;
            let length = if i == n - 1 { total - offset } else { base };
            segments.push(Segment::new(format!("part{i}"), offset as i64, length as i64));
        }
        segments
    }

    async fn segmented(
        &self,
        url: &str,
        dest_path: &Path,
        ctx: &RequestContext,
        opts: &DownloadOptions,
        total: u64,
        observer: Option<Box<dyn ProgressObserver>>,
    ) -> Result<PathBuf, DownloadError> {
        let segments = self.make_segments(total);
        let pool = session_pool::SessionPool::new(opts.multi_session, opts.pool_size);
        let cancel_token = CancellationToken::new();
        let downloaded_total = Arc::new(AtomicU64::new(0));

        let mut monitor_handle = None;
        if let Some(observer) = observer {
            let downloaded_total = Arc::clone(&downloaded_total);
            let cancel_token = cancel_token.clone();
            monitor_handle = Some(tokio::spawn(run_progress_monitor(
                observer,
                downloaded_total,
                total,
                cancel_token,
            )));
        }

        let mut handles = Vec::with_capacity(segments.len());
        for (i, segment) in segments.into_iter().enumerate() {
            let client = pool.client_for(i);
            let url = url.to_string();
            let ctx = ctx.clone();
            let part_path = part_path(dest_path, i);
            let downloaded_total = Arc::clone(&downloaded_total);
            let cancel_token = cancel_token.clone();
            let max_retries = opts.max_retries;
            handles.push(tokio::spawn(async move {
                segment::download_segment(segment, &client, &url, &ctx, part_path, downloaded_total, cancel_token, max_retries).await
            }));
        }

        let results = futures::future::join_all(handles).await;
        cancel_token.cancel();
        if let Some(handle) = monitor_handle {
            let _ = handle.await;
        }

        let mut finished = Vec::with_capacity(results.len());
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(segment)) => finished.push(segment),
                Ok(Err(e)) => {
                    cleanup_parts(dest_path, i + 1);
                    return Err(e);
                }
                Err(join_err) => {
                    cleanup_parts(dest_path, i + 1);
                    return Err(DownloadError::SegmentFailed(join_err.to_string()));
                }
            }
        }

        self.assemble(dest_path, finished.len()).await
    }

    async fn assemble(&self, dest_path: &Path, n_parts: usize) -> Result<PathBuf, DownloadError> {
        let merged_tmp = dest_path.with_extension("merged_tmp");
        let dest = dest_path.to_path_buf();
        let dest_dir = dest_path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
            let mut output = std::fs::File::create(&merged_tmp)?;
            for i in 0..n_parts {
                let part = part_path(&dest_dir, i);
                let mut input = std::fs::File::open(&part)?;
                std::io::copy(&mut input, &mut output)?;
            }
            output.flush()?;
            std::fs::rename(&merged_tmp, &dest)?;
            for i in 0..n_parts {
                let _ = std::fs::remove_file(part_path(&dest_dir, i));
            }
            Ok(())
        })
        .await
        .map_err(|e| DownloadError::SegmentFailed(e.to_string()))?
        .map_err(DownloadError::Disk)?;

        Ok(dest_path.to_path_buf())
    }

    /// Single-threaded streaming GET — the small-file path and the fallback
    /// target when segmented assembly fails (§4.2 "Assembly").
    async fn single_get(
        &self,
        url: &str,
        dest_path: &Path,
        ctx: &RequestContext,
        opts: &DownloadOptions,
    ) -> Result<PathBuf, DownloadError> {
        let single_part = dest_path.with_extension("single_part");
        let mut attempt = 0u32;

        loop {
            match self.try_single_get(url, &single_part, ctx, opts).await {
                Ok(()) => {
                    tokio::fs::rename(&single_part, dest_path).await.map_err(DownloadError::Disk)?;
                    return Ok(dest_path.to_path_buf());
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&single_part).await;
                    attempt += 1;
                    if attempt >= 3 {
                        return Err(e);
                    }
                    tokio::time::sleep(std::time::Duration::from_secs(attempt as u64)).await;
                }
            }
        }
    }

    async fn try_single_get(
        &self,
        url: &str,
        part_path: &Path,
        ctx: &RequestContext,
        opts: &DownloadOptions,
    ) -> Result<(), DownloadError> {
        let mut builder = self.client.get(url).timeout(std::time::Duration::from_secs(opts.timeout_secs));
        for (key, values) in &ctx.headers {
            for value in values {
                builder = builder.header(key, value);
            }
        }
        if let Some(cookies) = &ctx.cookies {
            builder = builder.header("Cookie", cookies);
        }

        let response = builder.send().await?;
        let file = tokio::fs::File::create(part_path).await.map_err(DownloadError::Disk)?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await.map_err(DownloadError::Disk)?;
        }
        writer.flush().await.map_err(DownloadError::Disk)?;
        Ok(())
    }
}

fn part_path(dest_path: &Path, index: usize) -> PathBuf {
    dest_path.with_extension(format!("part{index}"))
}

fn cleanup_parts(dest_path: &Path, up_to: usize) {
    for i in 0..up_to {
        let _ = std::fs::remove_file(part_path(dest_path, i));
    }
}

/// Polls `downloaded_total` every ~50ms and feeds a single aggregate
/// snapshot to the observer (a ProgressMonitor running concurrently with
/// the segment workers).
async fn run_progress_monitor(
    observer: Box<dyn ProgressObserver>,
    downloaded_total: Arc<AtomicU64>,
    total_bytes: u64,
    cancel_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(PROGRESS_POLL_INTERVAL_MS));
    let mut last = 0u64;
    let mut last_tick = tokio::time::Instant::now();

    loop {
        interval.tick().await;
        let downloaded = downloaded_total.load(Ordering::Relaxed);
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(last_tick).as_secs_f64();
        let speed = if elapsed > 0.0 { (downloaded.saturating_sub(last)) as f64 / elapsed } else { 0.0 };
        last = downloaded;
        last_tick = now;

        let remaining = total_bytes.saturating_sub(downloaded);
        let eta = if speed > 0.0 { remaining as f64 / speed } else { 0.0 };

        let snapshot = ProgressSnapshot {
            segments: vec![SegmentSnapshot {
                segment_id: "aggregate".to_string(),
                bytes_downloaded: downloaded,
                total_bytes,
                speed,
                eta_secs: eta,
            }],
            total_bytes_downloaded: downloaded,
            total_bytes,
            speed,
            eta_secs: eta,
            done: downloaded >= total_bytes,
        };
        observer.on_progress(&snapshot).await;

        if cancel_token.is_cancelled() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_segments_splits_evenly_with_remainder_on_last() {
        let d = Downloader::new(4);
        let segments = d.make_segments(100);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].length, 25);
        assert_eq!(segments[3].length, 25);

        let segments = d.make_segments(101);
        assert_eq!(segments[3].length, 26);
    }

    #[test]
    fn make_segments_offsets_are_contiguous() {
        let d = Downloader::new(3);
        let segments = d.make_segments(90);
        assert_eq!(segments[0].offset, 0);
        assert_eq!(segments[1].offset, 30);
        assert_eq!(segments[2].offset, 60);
    }
}
