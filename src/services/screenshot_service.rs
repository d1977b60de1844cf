//! Page screenshots through an external renderer.
//!
//! The renderer at `SCREENSHOT_SERVICE_URL` is called as
//! `GET {base}?url=https://{domain}&width=..&height=..&full_page=..&delay=..`
//! and must answer with JSON, which is passed through unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain_name;
use crate::error::AppError;
use crate::state::AppState;

pub const WIDTH_RANGE: (u32, u32) = (320, 3840);
pub const HEIGHT_RANGE: (u32, u32) = (240, 2160);
pub const MAX_DELAY_SECS: u32 = 10;

/// Query of `GET /screenshots`.
#[derive(Debug, Deserialize)]
pub struct ScreenshotQuery {
    pub domain: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub full_page: Option<bool>,
    pub delay: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Device classes captured by `/screenshots/responsive`.
pub const RESPONSIVE_VIEWPORTS: [(&str, Viewport); 3] = [
    ("mobile", Viewport { width: 375, height: 667 }),
    ("tablet", Viewport { width: 768, height: 1024 }),
    ("desktop", Viewport { width: 1920, height: 1080 }),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotRequest {
    pub domain: String,
    pub viewport: Viewport,
    pub full_page: bool,
    pub delay: u32,
}

impl ScreenshotRequest {
    /// Validate query parameters. Width defaults to 1920, height to 1080.
    pub fn from_query(query: ScreenshotQuery) -> Result<Self, AppError> {
        let domain = required_domain(query.domain.as_deref())?;

        let width = query.width.unwrap_or(1920);
        let height = query.height.unwrap_or(1080);
        let delay = query.delay.unwrap_or(0);

        if !(WIDTH_RANGE.0..=WIDTH_RANGE.1).contains(&width) {
            return Err(AppError::invalid(format!(
                "Width must be between {} and {}",
                WIDTH_RANGE.0, WIDTH_RANGE.1
            )));
        }
        if !(HEIGHT_RANGE.0..=HEIGHT_RANGE.1).contains(&height) {
            return Err(AppError::invalid(format!(
                "Height must be between {} and {}",
                HEIGHT_RANGE.0, HEIGHT_RANGE.1
            )));
        }
        if delay > MAX_DELAY_SECS {
            return Err(AppError::invalid(format!(
                "Delay must be between 0 and {MAX_DELAY_SECS} seconds"
            )));
        }

        Ok(Self {
            domain,
            viewport: Viewport { width, height },
            full_page: query.full_page.unwrap_or(false),
            delay,
        })
    }
}

pub fn required_domain(raw: Option<&str>) -> Result<String, AppError> {
    let raw = raw
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::invalid("Domain parameter is required"))?;
    domain_name::normalize(raw)
}

pub async fn capture(state: &AppState, request: &ScreenshotRequest) -> Result<Value, AppError> {
    let base = state
        .config
        .screenshot_service_url
        .as_deref()
        .ok_or_else(|| AppError::UpstreamFailure("Screenshot service is not configured".into()))?;

    let target = format!("https://{}", request.domain);
    let width = request.viewport.width.to_string();
    let height = request.viewport.height.to_string();
    let delay = request.delay.to_string();
    let response = state
        .http
        .get(base)
        .query(&[
            ("url", target.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("full_page", if request.full_page { "true" } else { "false" }),
            ("delay", delay.as_str()),
        ])
        .timeout(state.config.provider_timeout())
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AppError::UpstreamTimeout(format!("Screenshot of {} timed out", request.domain))
            } else {
                AppError::UpstreamFailure(format!("Screenshot service unreachable: {e}"))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::UpstreamFailure(format!(
            "Screenshot service returned {status}"
        )));
    }

    let rendered: Value = response.json().await.map_err(|e| {
        AppError::UpstreamFailure(format!("Screenshot service sent invalid JSON: {e}"))
    })?;

    Ok(json!({
        "domain": request.domain,
        "url": target,
        "viewport": request.viewport,
        "full_page": request.full_page,
        "delay": request.delay,
        "screenshot": rendered,
    }))
}

/// One capture per entry of [`RESPONSIVE_VIEWPORTS`], taken concurrently.
/// A failing device is reported as `{ "error": ... }`.
pub async fn capture_responsive(state: &AppState, domain: String) -> Result<Value, AppError> {
    let requests: Vec<(&str, ScreenshotRequest)> = RESPONSIVE_VIEWPORTS
        .iter()
        .map(|(device, viewport)| {
            (
                *device,
                ScreenshotRequest {
                    domain: domain.clone(),
                    viewport: *viewport,
                    full_page: false,
                    delay: 0,
                },
            )
        })
        .collect();

    let captures = futures::future::join_all(
        requests
            .iter()
            .map(|(_, request)| capture(state, request)),
    )
    .await;

    let mut screenshots = serde_json::Map::new();
    let mut failures = 0;
    for ((device, request), result) in requests.iter().zip(captures) {
        let entry = match result {
            Ok(capture) => capture,
            Err(e) => {
                failures += 1;
                json!({ "viewport": request.viewport, "error": e.public_message() })
            }
        };
        screenshots.insert((*device).to_string(), entry);
    }

    if failures == RESPONSIVE_VIEWPORTS.len() {
        return Err(AppError::UpstreamFailure(format!(
            "Every responsive screenshot of {domain} failed"
        )));
    }

    Ok(json!({ "domain": domain, "screenshots": screenshots }))
}
