//! Headless-browser rendering: navigate a page under one of three render
//! modes, capture the bytes/DOM extractors need, and enforce the two
//! invariants a completed crawl of this shape depends on — challenge
//! detection and media-capture-before-any-early-return.
//!
//! Launch and stealth setup go through `launch_browser`/
//! `apply_stealth_measures`; in-page reads use the `page.evaluate(..)
//! .await?.into_value()` idiom against a single shared CDP session, with a
//! separate navigate/capture path per render mode rather than one fixed
//! "load, then extract" sequence.

mod challenge;
mod media;

pub use challenge::{is_challenge_response, ChallengePatterns};
pub use media::MediaCapture;

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

/// Render mode, driving network-wait condition, media capture, and which
/// extractor families later run against the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Raw,
    Prerender,
    Full,
}

/// Why navigation's wait loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavEndReason {
    Fetch,
    Load,
    NetworkIdle,
    Timeout,
    Error,
}

/// Everything the extractor pipeline needs, produced by a single render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub final_url: String,
    pub status: u16,
    pub raw_body_bytes: Vec<u8>,
    pub rendered_dom_html: String,
    pub wait_condition_used: RenderMode,
    pub nav_end_reason: NavEndReason,
    pub timings: RenderTimings,
    /// Populated whenever media capture is enabled for the mode, regardless
    /// of `nav_end_reason`: media must never be silently dropped on a
    /// timeout or challenge page.
    pub media: Option<MediaCapture>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RenderTimings {
    pub navigation_ms: u64,
    pub dom_extraction_ms: u64,
    pub media_capture_ms: u64,
}

const NETWORK_IDLE_QUIET_WINDOW: Duration = Duration::from_millis(500);
const CHALLENGE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const CHALLENGE_MAX_WAIT: Duration = Duration::from_secs(15);

/// Drive `page` to `url` under `mode`, returning the captured render state
/// or a [`CrawlError`]. Challenge detection and (for `full` mode) media
/// capture both happen before this function inspects `timeout` for an early
/// return, so a timed-out `full`-mode page still carries its screenshot.
///
/// When `stealth` is set, evasion scripts are injected into the page before
/// navigation begins (no-op for `raw` mode, which executes no JS at all).
pub async fn render(
    page: &Page,
    url: &str,
    mode: RenderMode,
    timeout: Duration,
    output_dir: &std::path::Path,
    stealth: bool,
) -> Result<RenderOutput, CrawlError> {
    let started = Instant::now();
    let deadline = started + timeout;

    if stealth && mode != RenderMode::Raw {
        if let Err(err) = crate::kromekover::inject(page.clone()).await {
            tracing::warn!("stealth injection failed for {url}: {err}");
        }
    }

    let navigation = tokio::time::timeout(timeout, navigate(page, url, mode)).await;
    let (status, nav_end_reason) = match navigation {
        Ok(Ok(status)) => (status, wait_condition_reason(mode)),
        Ok(Err(err)) => {
            return Err(CrawlError::RenderFailed {
                url: url.to_string(),
                source: err,
            });
        }
        Err(_elapsed) => (0, NavEndReason::Timeout),
    };
    let navigation_ms = started.elapsed().as_millis() as u64;

    // Challenge detection runs even on a navigation timeout status (0), since
    // a slow challenge page and a genuinely hung navigation look the same
    // from here; the DOM check below is what actually discriminates.
    let mut final_status = status;
    let mut nav_end_reason = nav_end_reason;
    if is_challenge_response(final_status, page).await {
        let resolved = wait_for_challenge_resolution(page, CHALLENGE_MAX_WAIT).await;
        if !resolved {
            return Err(CrawlError::ChallengeDetected {
                url: url.to_string(),
                waited_ms: CHALLENGE_MAX_WAIT.as_millis() as u64,
            });
        }
        final_status = current_status(page).await.unwrap_or(final_status);
    }

    let dom_started = Instant::now();
    let rendered_dom_html = page.content().await.unwrap_or_default();
    let dom_extraction_ms = dom_started.elapsed().as_millis() as u64;

    // Media capture happens unconditionally for `full` mode here, before any
    // further early return (timeout included) below.
    let media_started = Instant::now();
    let media = if mode == RenderMode::Full {
        match media::capture(page, url, output_dir).await {
            Ok(capture) => Some(capture),
            Err(err) => {
                tracing::warn!("media capture failed for {url}: {err}");
                None
            }
        }
    } else {
        None
    };
    let media_capture_ms = media_started.elapsed().as_millis() as u64;

    if mode == RenderMode::Full && nav_end_reason != NavEndReason::Timeout {
        nav_end_reason = wait_network_idle(page, deadline).await;
    }

    let final_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());
    let raw_body_bytes = rendered_dom_html.clone().into_bytes();

    Ok(RenderOutput {
        final_url,
        status: final_status,
        raw_body_bytes,
        rendered_dom_html,
        wait_condition_used: mode,
        nav_end_reason,
        timings: RenderTimings {
            navigation_ms,
            dom_extraction_ms,
            media_capture_ms,
        },
        media,
    })
}

async fn navigate(page: &Page, url: &str, mode: RenderMode) -> anyhow::Result<u16> {
    if mode == RenderMode::Raw {
        page.execute(NavigateParams::new(url)).await?;
    } else {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
    }
    let status = page
        .evaluate("performance.getEntriesByType('navigation')[0]?.responseStatus ?? 200")
        .await
        .ok()
        .and_then(|r| r.into_value::<u16>().ok())
        .unwrap_or(200);
    Ok(status)
}

fn wait_condition_reason(mode: RenderMode) -> NavEndReason {
    match mode {
        RenderMode::Raw => NavEndReason::Fetch,
        RenderMode::Prerender => NavEndReason::Load,
        RenderMode::Full => NavEndReason::Load,
    }
}

async fn current_status(page: &Page) -> Option<u16> {
    page.evaluate("performance.getEntriesByType('navigation')[0]?.responseStatus ?? 200")
        .await
        .ok()
        .and_then(|r| r.into_value::<u16>().ok())
}

async fn wait_for_challenge_resolution(page: &Page, max_wait: Duration) -> bool {
    let deadline = Instant::now() + max_wait;
    while Instant::now() < deadline {
        tokio::time::sleep(CHALLENGE_POLL_INTERVAL).await;
        let status = current_status(page).await.unwrap_or(200);
        if !is_challenge_response(status, page).await {
            return true;
        }
    }
    false
}

/// Poll for a quiet network window (no in-flight requests for 500ms),
/// bounded by `deadline`. A heuristic, not an exact CDP network-event
/// subscription: it can both under- and over-fire relative to true
/// idleness, which is acceptable for a render-completion signal.
async fn wait_network_idle(page: &Page, deadline: Instant) -> NavEndReason {
    loop {
        if Instant::now() >= deadline {
            return NavEndReason::Timeout;
        }
        let in_flight = page
            .evaluate("window.performance.getEntriesByType('resource').filter(r => !r.responseEnd).length")
            .await
            .ok()
            .and_then(|r| r.into_value::<u32>().ok())
            .unwrap_or(0);
        if in_flight == 0 {
            tokio::time::sleep(NETWORK_IDLE_QUIET_WINDOW).await;
            let still_quiet = page
                .evaluate("window.performance.getEntriesByType('resource').filter(r => !r.responseEnd).length")
                .await
                .ok()
                .and_then(|r| r.into_value::<u32>().ok())
                .unwrap_or(0)
                == 0;
            if still_quiet {
                return NavEndReason::NetworkIdle;
            }
        } else {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
