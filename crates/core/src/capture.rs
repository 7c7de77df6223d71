//! Screenshot capture cascades
//!
//! Page captures degrade through five tiers, from a stabilized lossless full
//! page down to an emergency shot. Element captures degrade through three
//! element tiers and then fall back to a page capture. When everything fails
//! a fixed 1x1 PNG is returned so callers always get an artifact.

use async_trait::async_trait;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cascade::{Cascade, Tier, TierDescriptor};
use crate::clock::Clock;
use crate::config::CaptureConfig;
use crate::error::{DriverError, DriverResult};
use crate::handler::ResilienceHandler;
use crate::model::{Resolution, Target};
use crate::page::{
    collect_screenshot_metadata, ClipRect, ImageFormat, LoadState, Page, ScreenshotOptions,
};

pub const CAPTURE_OPERATION: &str = "capture_screenshot";
pub const ELEMENT_CAPTURE_OPERATION: &str = "capture_element_screenshot";

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Transparent 1x1 RGBA PNG
pub const PLACEHOLDER_PNG: [u8; 68] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0B, 0x49, 0x44, 0x41, 0x54, 0x78, 0xDA, 0x63, 0x60,
    0x00, 0x02, 0x00, 0x00, 0x05, 0x00, 0x01, 0xE9, 0xFA, 0xDC, 0xD8, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Style overrides applied before the primary capture
pub const STABILIZE_CSS: &str = "*, *::before, *::after { \
animation-duration: 0s !important; animation-delay: 0s !important; \
transition-duration: 0s !important; transition-delay: 0s !important; \
caret-color: transparent !important; } \
::-webkit-scrollbar { display: none !important; } \
html, body { scrollbar-width: none !important; }";

pub fn placeholder_image() -> Vec<u8> {
    PLACEHOLDER_PNG.to_vec()
}

/// Format of encoded image bytes, judged by signature
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&JPEG_SIGNATURE) {
        Some(ImageFormat::Jpeg)
    } else {
        None
    }
}

/// True when `bytes` carry a PNG or JPEG signature and decode to a non-empty image
pub fn validate_screenshot(bytes: &[u8]) -> bool {
    if detect_format(bytes).is_none() {
        return false;
    }
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let (width, height) = img.dimensions();
            width > 0 && height > 0
        }
        Err(e) => {
            debug!("Screenshot failed to decode: {}", e);
            false
        }
    }
}

/// Waits that make a page deterministic before capture
#[derive(Debug, Clone)]
pub struct Stabilization {
    pub network_idle_timeout: Duration,
    pub settle_delay: Duration,
}

impl Stabilization {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            network_idle_timeout: config.network_idle_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    /// Network idle, fonts ready, animations and scrollbars off, then settle
    pub async fn apply(&self, page: &dyn Page) -> DriverResult<()> {
        page.wait_for_load_state(LoadState::NetworkIdle, self.network_idle_timeout)
            .await?;
        page.wait_for_fonts().await?;
        page.add_style_tag(STABILIZE_CSS).await?;
        page.wait_for_timeout(self.settle_delay).await;
        Ok(())
    }
}

/// Page screenshot with fixed options
pub struct PageCaptureTier {
    descriptor: TierDescriptor,
    options: ScreenshotOptions,
    stabilization: Option<Stabilization>,
}

impl PageCaptureTier {
    pub fn new(descriptor: TierDescriptor, options: ScreenshotOptions) -> Self {
        Self {
            descriptor,
            options,
            stabilization: None,
        }
    }

    pub fn stabilized(mut self, stabilization: Stabilization) -> Self {
        self.stabilization = Some(stabilization);
        self
    }
}

#[async_trait]
impl Tier for PageCaptureTier {
    type Output = Vec<u8>;

    fn descriptor(&self) -> TierDescriptor {
        self.descriptor
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<Vec<u8>> {
        if let Some(stabilization) = &self.stabilization {
            stabilization.apply(page).await?;
        }
        page.screenshot(&self.options).await
    }
}

/// Screenshot clipped to the current viewport
pub struct ViewportClipTier {
    descriptor: TierDescriptor,
}

#[async_trait]
impl Tier for ViewportClipTier {
    type Output = Vec<u8>;

    fn descriptor(&self) -> TierDescriptor {
        self.descriptor
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<Vec<u8>> {
        let options = ScreenshotOptions {
            clip: page.viewport().await.map(ClipRect::from),
            ..Default::default()
        };
        page.screenshot(&options).await
    }
}

/// Element screenshot after waiting for its locator
pub struct ElementCaptureTier {
    descriptor: TierDescriptor,
    selector: String,
    wait: Duration,
    options: ScreenshotOptions,
}

#[async_trait]
impl Tier for ElementCaptureTier {
    type Output = Vec<u8>;

    fn descriptor(&self) -> TierDescriptor {
        self.descriptor
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<Vec<u8>> {
        page.wait_for_selector(&self.selector, self.wait).await?;
        page.element_screenshot(&self.selector, &self.options).await
    }
}

/// Full-page screenshot clipped to the element's bounding box
pub struct ElementClipTier {
    descriptor: TierDescriptor,
    selector: String,
}

#[async_trait]
impl Tier for ElementClipTier {
    type Output = Vec<u8>;

    fn descriptor(&self) -> TierDescriptor {
        self.descriptor
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<Vec<u8>> {
        let bounds = page
            .bounding_box(&self.selector)
            .await?
            .ok_or_else(|| DriverError::ElementNotFound(self.selector.clone()))?;
        let options = ScreenshotOptions {
            full_page: true,
            clip: Some(bounds),
            ..Default::default()
        };
        page.screenshot(&options).await
    }
}

/// The five page tiers. `primary` replaces the options of tier 0.
pub fn page_capture_cascade(
    config: &CaptureConfig,
    primary: Option<ScreenshotOptions>,
) -> Cascade<'static, Vec<u8>> {
    let primary_options = primary.unwrap_or(ScreenshotOptions {
        format: ImageFormat::Png,
        full_page: true,
        disable_animations: true,
        timeout_ms: Some(config.primary_timeout_ms),
        ..Default::default()
    });

    Cascade::new(
        PageCaptureTier::new(TierDescriptor::new("full-quality", 100, 100), primary_options)
            .stabilized(Stabilization::from_config(config)),
    )
    .fallback(PageCaptureTier::new(
        TierDescriptor::new("reduced-quality", 80, 60),
        ScreenshotOptions {
            format: ImageFormat::Jpeg,
            quality: Some(config.jpeg_quality),
            full_page: true,
            timeout_ms: Some(config.reduced_timeout_ms),
            ..Default::default()
        },
    ))
    .fallback(PageCaptureTier::new(
        TierDescriptor::new("basic-viewport", 60, 40),
        ScreenshotOptions {
            full_page: false,
            timeout_ms: Some(config.viewport_timeout_ms),
            ..Default::default()
        },
    ))
    .fallback(ViewportClipTier {
        descriptor: TierDescriptor::new("viewport-clip", 40, 20),
    })
    .fallback(PageCaptureTier::new(
        TierDescriptor::new("emergency", 20, 10),
        ScreenshotOptions {
            timeout_ms: Some(config.emergency_timeout_ms),
            ..Default::default()
        },
    ))
}

/// The three element tiers
pub fn element_capture_cascade(config: &CaptureConfig, selector: &str) -> Cascade<'static, Vec<u8>> {
    Cascade::new(ElementCaptureTier {
        descriptor: TierDescriptor::new("element-lossless", 100, 100),
        selector: selector.to_string(),
        wait: Duration::from_millis(config.element_wait_ms),
        options: ScreenshotOptions {
            format: ImageFormat::Png,
            disable_animations: true,
            timeout_ms: Some(config.primary_timeout_ms),
            ..Default::default()
        },
    })
    .fallback(ElementCaptureTier {
        descriptor: TierDescriptor::new("element-lossy", 80, 70),
        selector: selector.to_string(),
        wait: Duration::from_millis(config.element_extended_wait_ms),
        options: ScreenshotOptions {
            format: ImageFormat::Jpeg,
            quality: Some(config.jpeg_quality),
            timeout_ms: Some(config.reduced_timeout_ms),
            ..Default::default()
        },
    })
    .fallback(ElementClipTier {
        descriptor: TierDescriptor::new("element-clip", 60, 50),
        selector: selector.to_string(),
    })
}

/// One artifact requested from a batch capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub name: String,
    pub theme: String,
    /// Capture just this element instead of the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// Outcome of one batch item; failed items carry the placeholder image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCaptureItem {
    pub name: String,
    pub theme: String,
    pub success: bool,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<C: Clock> ResilienceHandler<C> {
    /// Capture the page through the five-tier cascade. Never fails: when every
    /// tier fails the placeholder PNG is returned and a `fail` report is logged.
    pub async fn capture_with_fallbacks(
        &mut self,
        page: &dyn Page,
        name: &str,
        theme: &str,
        options: Option<ScreenshotOptions>,
    ) -> Vec<u8> {
        match self.try_capture(page, name, theme, options).await {
            Ok(bytes) => bytes,
            Err(_) => placeholder_image(),
        }
    }

    /// Capture one element through its three tiers, then the page cascade
    pub async fn capture_element_with_fallbacks(
        &mut self,
        page: &dyn Page,
        selector: &str,
        name: &str,
        theme: &str,
    ) -> Vec<u8> {
        match self.try_capture_element(page, selector, name, theme).await {
            Ok(bytes) => bytes,
            Err(_) => placeholder_image(),
        }
    }

    /// Run the matching cascade for every request. Items fail independently and
    /// a failed item gets the placeholder without aborting the batch.
    pub async fn capture_batch(
        &mut self,
        page: &dyn Page,
        requests: &[CaptureRequest],
    ) -> Vec<BatchCaptureItem> {
        let mut items = Vec::with_capacity(requests.len());

        for request in requests {
            let outcome = match &request.selector {
                Some(selector) => {
                    self.try_capture_element(page, selector, &request.name, &request.theme)
                        .await
                }
                None => {
                    self.try_capture(page, &request.name, &request.theme, None)
                        .await
                }
            };

            let item = match outcome {
                Ok(bytes) => BatchCaptureItem {
                    name: request.name.clone(),
                    theme: request.theme.clone(),
                    success: true,
                    bytes,
                    error: None,
                },
                Err(e) => BatchCaptureItem {
                    name: request.name.clone(),
                    theme: request.theme.clone(),
                    success: false,
                    bytes: placeholder_image(),
                    error: Some(e.to_string()),
                },
            };
            items.push(item);
        }

        let failed = items.iter().filter(|i| !i.success).count();
        info!(
            "Batch capture finished: {} of {} succeeded",
            items.len() - failed,
            items.len()
        );
        items
    }

    async fn try_capture(
        &mut self,
        page: &dyn Page,
        name: &str,
        theme: &str,
        options: Option<ScreenshotOptions>,
    ) -> DriverResult<Vec<u8>> {
        let target = Target::new(name, theme).with_viewport(page.viewport().await);
        let context = self.context(CAPTURE_OPERATION, target);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let metadata = collect_screenshot_metadata(page, self.clock().now()).await;
            debug!("Capturing '{}' ({}): {:?}", name, theme, metadata);
        }

        let cascade = page_capture_cascade(&self.config().capture, options);
        match cascade.run(self, &context, page).await {
            Ok(success) => {
                if success.tier > 0 {
                    info!(
                        "Captured '{}' ({}) with fallback '{}'",
                        name, theme, success.descriptor.name
                    );
                }
                Ok(success.value)
            }
            Err(failure) => {
                error!(
                    "All {} capture tiers failed for '{}' ({}), using placeholder: {}",
                    failure.tiers_attempted, name, theme, failure.error
                );
                let final_context =
                    context.for_attempt(failure.tiers_attempted as u32, self.clock().now());
                self.log_error(&final_context, &failure.error, Resolution::Fail);
                Err(failure.error)
            }
        }
    }

    async fn try_capture_element(
        &mut self,
        page: &dyn Page,
        selector: &str,
        name: &str,
        theme: &str,
    ) -> DriverResult<Vec<u8>> {
        let target = Target::new(name, theme).with_viewport(page.viewport().await);
        let context = self.context(ELEMENT_CAPTURE_OPERATION, target);

        let cascade = element_capture_cascade(&self.config().capture, selector);
        match cascade.run(self, &context, page).await {
            Ok(success) => Ok(success.value),
            Err(failure) => {
                warn!(
                    "All element tiers failed for '{}' ({}), capturing the full page instead",
                    selector, name
                );
                // The element counts as recovered only once the page capture has produced bytes
                let outcome = self.try_capture(page, name, theme, None).await;
                let final_context =
                    context.for_attempt(failure.tiers_attempted as u32, self.clock().now());
                let resolution = match outcome {
                    Ok(_) => Resolution::Fallback,
                    Err(_) => Resolution::Fail,
                };
                self.log_error(&final_context, &failure.error, resolution);
                outcome
            }
        }
    }
}
