//! Browser page abstraction consumed by the cascades

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::DriverResult;
use crate::model::Viewport;

/// Encoded image format of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// Rectangle in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Viewport> for ClipRect {
    fn from(v: Viewport) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: v.width as f64,
            height: v.height as f64,
        }
    }
}

/// Options for a page or element screenshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenshotOptions {
    pub format: ImageFormat,

    /// JPEG quality (ignored for PNG)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,

    #[serde(default)]
    pub full_page: bool,

    #[serde(default)]
    pub disable_animations: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipRect>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Resolves once `document.fonts` has finished loading
pub const FONTS_READY: &str = "document.fonts.ready.then(() => true)";

/// Load states a page can be waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// A live page in some browser-automation driver.
///
/// Implementations report failures as [`crate::DriverError`] so the classifier
/// can tell transient from fatal conditions.
#[async_trait]
pub trait Page: Send + Sync {
    async fn url(&self) -> DriverResult<String>;

    async fn screenshot(&self, options: &ScreenshotOptions) -> DriverResult<Vec<u8>>;

    async fn element_screenshot(
        &self,
        selector: &str,
        options: &ScreenshotOptions,
    ) -> DriverResult<Vec<u8>>;

    /// Wait until `selector` is visible
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Bounding box of the first match, `None` when it is not rendered
    async fn bounding_box(&self, selector: &str) -> DriverResult<Option<ClipRect>>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> DriverResult<()>;

    async fn wait_for_timeout(&self, duration: Duration);

    /// Wait until web fonts have loaded
    async fn wait_for_fonts(&self) -> DriverResult<()> {
        self.evaluate(FONTS_READY).await.map(|_| ())
    }

    /// Evaluate a JavaScript expression; promises are awaited
    async fn evaluate(&self, expression: &str) -> DriverResult<serde_json::Value>;

    async fn add_style_tag(&self, css: &str) -> DriverResult<()>;

    async fn add_script_tag(&self, source: &str) -> DriverResult<()>;

    async fn viewport(&self) -> Option<Viewport>;

    async fn user_agent(&self) -> DriverResult<String>;

    fn browser_name(&self) -> String;
}

/// Diagnostic snapshot taken around a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotMetadata {
    pub url: String,
    pub user_agent: String,
    pub viewport: Option<Viewport>,
    pub device_pixel_ratio: f64,
    pub timestamp: DateTime<Utc>,
    pub browser: String,
}

/// Collect capture diagnostics; individual probe failures degrade to placeholders
pub async fn collect_screenshot_metadata(page: &dyn Page, timestamp: DateTime<Utc>) -> ScreenshotMetadata {
    let url = page.url().await.unwrap_or_else(|e| {
        debug!("Could not read page url: {}", e);
        "unknown".to_string()
    });
    let user_agent = page
        .user_agent()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    let device_pixel_ratio = page
        .evaluate("window.devicePixelRatio")
        .await
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(1.0);

    ScreenshotMetadata {
        url,
        user_agent,
        viewport: page.viewport().await,
        device_pixel_ratio,
        timestamp,
        browser: page.browser_name(),
    }
}
