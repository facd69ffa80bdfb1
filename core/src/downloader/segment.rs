//! Single-segment worker, adapted from `segment_grabber.rs`'s `download_segment`:
//! same Range-request / streaming-write / retry shape, generalized to the
//! spec's 8 KiB chunk size and linear `attempt * 1s` backoff (§4.2).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::types::{RequestContext, Segment, SegmentState};
use crate::error::DownloadError;

const CHUNK_LOG_BYTES: usize = 8 * 1024;

fn apply_headers(mut builder: reqwest::RequestBuilder, ctx: &RequestContext) -> reqwest::RequestBuilder {
    for (key, values) in &ctx.headers {
        if key.eq_ignore_ascii_case("range") {
            continue;
        }
        for value in values {
            builder = builder.header(key, value);
        }
    }
    if let Some(cookies) = &ctx.cookies {
        builder = builder.header("Cookie", cookies);
    }
    builder
}

/// Download one segment to `part_path`, streaming in 8 KiB chunks and
/// bumping `downloaded_total` (shared across all segments) as bytes land.
///
/// Retries up to `max_retries` times, backing off `attempt * 1s` between
/// tries, deleting the partial part file before each retry so resumed
/// reads never see stale bytes from a previous failed attempt.
pub async fn download_segment(
    mut segment: Segment,
    client: &Client,
    url: &str,
    ctx: &RequestContext,
    part_path: PathBuf,
    downloaded_total: Arc<AtomicU64>,
    cancel_token: CancellationToken,
    max_retries: u32,
) -> Result<Segment, DownloadError> {
    segment.state = SegmentState::Downloading;
    let mut attempt = 0u32;

    loop {
        if cancel_token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        match try_download_once(
            &mut segment,
            client,
            url,
            ctx,
            &part_path,
            &downloaded_total,
            &cancel_token,
        )
        .await
        {
            Ok(()) => {
                segment.state = SegmentState::Finished;
                return Ok(segment);
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                attempt += 1;
                if attempt >= max_retries {
                    segment.state = SegmentState::Failed;
                    log::error!("[segment] {} failed after {} attempts: {}", segment.id, attempt, e);
                    return Err(DownloadError::MaxRetryExceeded);
                }
                log::warn!("[segment] {} attempt {} failed: {}, retrying", segment.id, attempt, e);
                tokio::time::sleep(std::time::Duration::from_secs(attempt as u64)).await;
                segment.downloaded = 0;
            }
        }
    }
}

async fn try_download_once(
    segment: &mut Segment,
    client: &Client,
    url: &str,
    ctx: &RequestContext,
    part_path: &Path,
    downloaded_total: &Arc<AtomicU64>,
    cancel_token: &CancellationToken,
) -> Result<(), DownloadError> {
    let builder = client.get(url);
    let mut builder = apply_headers(builder, ctx);

    if segment.length > 0 {
        let start = segment.offset + segment.downloaded;
        let end = segment.offset + segment.length - 1;
        builder = builder.header("Range", format!("bytes={start}-{end}"));
    }

    let response = builder.send().await?;
    let status = response.status();

    if segment.length > 0 && status != reqwest::StatusCode::PARTIAL_CONTENT {
        log::warn!(
            "[segment] {} expected 206 Partial Content, got {} — server may be ignoring Range",
            segment.id, status
        );
    }

    if let Some(range_header) = response.headers().get(reqwest::header::CONTENT_RANGE) {
        if let Ok(range_str) = range_header.to_str() {
            let expected = format!("bytes {}-{}", segment.offset + segment.downloaded, segment.offset + segment.length - 1);
            if segment.length > 0 && !range_str.starts_with(&expected) {
                log::warn!("[segment] {} Content-Range mismatch: got {}, expected prefix {}", segment.id, range_str, expected);
            }
        }
    }

    let file = tokio::fs::File::create(part_path).await.map_err(DownloadError::Disk)?;
    let mut writer = tokio::io::BufWriter::with_capacity(CHUNK_LOG_BYTES, file);

    let remaining: u64 = if segment.length > 0 {
        (segment.length - segment.downloaded) as u64
    } else {
        u64::MAX
    };
    let mut written: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        if cancel_token.is_cancelled() {
            let _ = writer.flush().await;
            return Err(DownloadError::Cancelled);
        }
        let chunk = chunk?;
        let to_write = if segment.length > 0 {
            let left = remaining - written;
            let usable = (chunk.len() as u64).min(left);
            &chunk[..usable as usize]
        } else {
            &chunk[..]
        };
        if to_write.is_empty() {
            break;
        }
        writer.write_all(to_write).await.map_err(DownloadError::Disk)?;
        let n = to_write.len() as u64;
        written += n;
        segment.downloaded += n as i64;
        downloaded_total.fetch_add(n, Ordering::Relaxed);

        if segment.length > 0 && written >= remaining {
            break;
        }
    }
    writer.flush().await.map_err(DownloadError::Disk)?;
    Ok(())
}
