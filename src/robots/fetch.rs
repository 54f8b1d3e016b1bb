//! Fetching and revalidating one origin's `robots.txt`.

use super::{RobotsEntry, RobotsRules};
use std::time::Instant;

/// Fetch `${origin}/robots.txt`. Network errors, 5xx, and non-404/410 4xx
/// responses all degrade to "no rules" (allow-all) rather than blocking the
/// crawl; 404/410 are the RFC-sanctioned "no rules" case.
pub async fn fetch_robots(
    http: &reqwest::Client,
    origin: &str,
    user_agent: &str,
) -> anyhow::Result<RobotsEntry> {
    let url = format!("{origin}/robots.txt");
    let response = match http.get(&url).header("User-Agent", user_agent).send().await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!("robots.txt fetch failed for {origin}: {err}");
            return Ok(allow_all_entry(None, None));
        }
    };

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Ok(allow_all_entry(None, None));
    }
    if !status.is_success() {
        tracing::warn!("robots.txt at {origin} returned {status}, treating as no rules");
        return Ok(allow_all_entry(None, None));
    }

    let etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let last_modified = response
        .headers()
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response.text().await.unwrap_or_default();
    Ok(RobotsEntry {
        rules: RobotsRules::parse(&body),
        fetched_at: Instant::now(),
        etag,
        last_modified,
    })
}

/// Revalidate a stale entry via conditional GET (If-None-Match / If-Modified-Since).
/// A `304 Not Modified` response simply refreshes `fetched_at`.
pub async fn revalidate(
    http: &reqwest::Client,
    origin: &str,
    user_agent: &str,
    previous: &RobotsEntry,
) -> anyhow::Result<RobotsEntry> {
    let url = format!("{origin}/robots.txt");
    let mut request = http.get(&url).header("User-Agent", user_agent);
    if let Some(etag) = &previous.etag {
        request = request.header(reqwest::header::IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = &previous.last_modified {
        request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
    }

    let response = match request.send().await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!("robots.txt revalidation failed for {origin}: {err}");
            return Ok(RobotsEntry {
                fetched_at: Instant::now(),
                ..previous.clone()
            });
        }
    };

    if response.status() == reqwest::StatusCode::NOT_MODIFIED {
        return Ok(RobotsEntry {
            fetched_at: Instant::now(),
            ..previous.clone()
        });
    }

    fetch_robots(http, origin, user_agent).await
}

fn allow_all_entry(etag: Option<String>, last_modified: Option<String>) -> RobotsEntry {
    RobotsEntry {
        rules: RobotsRules::allow_all(),
        fetched_at: Instant::now(),
        etag,
        last_modified,
    }
}
