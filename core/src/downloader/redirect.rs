//! Manual redirect chase + pre-check (§4.2), grounded on `segment_grabber.rs`'s
//! `probe_url` (same idea — cheap metadata request before committing to a
//! transfer strategy) but walking redirects by hand instead of delegating to
//! `reqwest`'s built-in follower, so `return_flag`/`use_get` short-circuits apply.

use std::collections::HashSet;

use reqwest::Client;

use super::types::{DownloadOptions, PreCheck, RequestContext};
use crate::error::DownloadError;

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

fn apply_headers(mut builder: reqwest::RequestBuilder, ctx: &RequestContext) -> reqwest::RequestBuilder {
    for (key, values) in &ctx.headers {
        for value in values {
            builder = builder.header(key, value);
        }
    }
    if let Some(cookies) = &ctx.cookies {
        builder = builder.header("Cookie", cookies);
    }
    builder
}

fn resolve_location(current: &str, location: &str) -> String {
    match reqwest::Url::parse(location) {
        Ok(url) => url.to_string(),
        Err(_) => reqwest::Url::parse(current)
            .and_then(|base| base.join(location))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| location.to_string()),
    }
}

/// Follow redirects manually up to `opts.max_redirects`, then issue a
/// HEAD (or GET, if `opts.use_get`) pre-check on the final URL.
pub async fn chase_and_precheck(
    client: &Client,
    start_url: &str,
    ctx: &RequestContext,
    opts: &DownloadOptions,
) -> Result<PreCheck, DownloadError> {
    let mut current = start_url.to_string();
    let mut visited: HashSet<String> = HashSet::new();

    if opts.max_redirects > 0 {
        for _ in 0..opts.max_redirects {
            if !visited.insert(current.clone()) {
                return Err(DownloadError::RedirectLoop(current));
            }

            let builder = client
                .get(&current)
                .header("Range", "bytes=0-0")
                .timeout(std::time::Duration::from_secs(opts.timeout_secs));
            let builder = apply_headers(builder, ctx);
            let response = builder.send().await?;
            let status = response.status().as_u16();

            if !REDIRECT_STATUSES.contains(&status) {
                break;
            }

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let Some(location) = location else { break };

            if let Some(flag) = &opts.return_flag {
                if location.contains(flag.as_str()) {
                    current = resolve_location(&current, &location);
                    break;
                }
            }

            current = resolve_location(&current, &location);
        }

        if visited.len() >= opts.max_redirects as usize && visited.contains(&current) {
            return Err(DownloadError::TooManyRedirects(opts.max_redirects as usize));
        }
    }

    precheck(client, &current, ctx, opts).await
}

async fn precheck(
    client: &Client,
    url: &str,
    ctx: &RequestContext,
    opts: &DownloadOptions,
) -> Result<PreCheck, DownloadError> {
    let builder = if opts.use_get {
        client.get(url).header("Range", "bytes=0-0")
    } else {
        client.head(url)
    }
    .timeout(std::time::Duration::from_secs(opts.timeout_secs));
    let builder = apply_headers(builder, ctx);

    let response = builder.send().await?;
    let status_is_success = response.status().is_success() || response.status().as_u16() == 206;

    if !status_is_success && !opts.return_filed_url {
        return Err(DownloadError::SegmentFailed(format!(
            "pre-check failed with status {}",
            response.status()
        )));
    }

    let content_length = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| response.content_length());

    let accepts_ranges = response
        .headers()
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase().contains("bytes"))
        .unwrap_or(false);

    Ok(PreCheck {
        final_url: response.url().to_string(),
        content_length,
        accepts_ranges,
        status_is_success,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_location_against_base() {
        let resolved = resolve_location("https://example.com/a/b", "/c/d");
        assert_eq!(resolved, "https://example.com/c/d");
    }

    #[test]
    fn resolve_absolute_location_passes_through() {
        let resolved = resolve_location("https://example.com/a", "https://cdn.example.com/x");
        assert_eq!(resolved, "https://cdn.example.com/x");
    }
}
