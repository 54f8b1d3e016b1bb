//! Screenshot (desktop + mobile) and favicon capture for `full`-mode renders.
//!
//! Uses `CaptureScreenshotParams` against the page's CDP session for both
//! viewport sizes and the favicon, returning bytes rather than writing a
//! per-URL mirror path: the archive writer owns placement (§4.8).

use std::path::Path;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};

use crate::utils::constants::SCREENSHOT_QUALITY;

const MOBILE_WIDTH: u32 = 390;
const MOBILE_HEIGHT: u32 = 844;

/// Captured media for a single page render. Screenshots are JPEG-encoded
/// (§4.8's archive layout names `.jpg` paths under `media/screenshots/`).
#[derive(Debug, Clone)]
pub struct MediaCapture {
    pub screenshot_desktop_jpg: Vec<u8>,
    pub screenshot_mobile_jpg: Vec<u8>,
    pub favicon: Option<Vec<u8>>,
}

pub async fn capture(page: &Page, url: &str, _output_dir: &Path) -> anyhow::Result<MediaCapture> {
    let desktop_params = CaptureScreenshotParams {
        quality: Some(i64::from(SCREENSHOT_QUALITY)),
        format: Some(CaptureScreenshotFormat::Jpeg),
        capture_beyond_viewport: Some(true),
        ..Default::default()
    };
    let screenshot_desktop_jpg = page.screenshot(desktop_params).await?;

    page.execute(
        SetDeviceMetricsOverrideParams::builder()
            .width(MOBILE_WIDTH)
            .height(MOBILE_HEIGHT)
            .device_scale_factor(2.0)
            .mobile(true)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build mobile device metrics: {e}"))?,
    )
    .await?;
    let mobile_params = CaptureScreenshotParams {
        quality: Some(i64::from(SCREENSHOT_QUALITY)),
        format: Some(CaptureScreenshotFormat::Jpeg),
        capture_beyond_viewport: Some(true),
        ..Default::default()
    };
    let screenshot_mobile_jpg = page.screenshot(mobile_params).await?;

    let favicon = fetch_favicon(page, url).await;

    Ok(MediaCapture {
        screenshot_desktop_jpg,
        screenshot_mobile_jpg,
        favicon,
    })
}

async fn fetch_favicon(page: &Page, url: &str) -> Option<Vec<u8>> {
    let href = page
        .evaluate("document.querySelector(\"link[rel~='icon']\")?.href ?? ''")
        .await
        .ok()
        .and_then(|r| r.into_value::<String>().ok())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            url::Url::parse(url)
                .ok()
                .and_then(|u| u.join("/favicon.ico").ok())
                .map(|u| u.to_string())
        })?;

    let client = reqwest::Client::new();
    let response = client.get(&href).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.bytes().await.ok().map(|b| b.to_vec())
}
