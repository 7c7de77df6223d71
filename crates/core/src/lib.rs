//! Flakeguard Core
//!
//! Retries, fallback cascades and error analytics for flaky browser-test
//! operations: page and element screenshots and accessibility audits.

pub mod accessibility;
pub mod backoff;
pub mod capture;
pub mod cascade;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod handler;
pub mod log;
pub mod model;
pub mod page;
pub mod report;

// Re-export commonly used types
pub use accessibility::{
    compute_score, validate_accessibility_tools, AccessibilityEngine,
    AccessibilityFallbackResult, ConformanceLevel, Impact, PassedCheck, ResultSource,
    RuleSelection, ScanOutcome, ToolAvailability, Violation, ViolationNode,
};
pub use backoff::backoff_delay;
pub use capture::{placeholder_image, validate_screenshot, BatchCaptureItem, CaptureRequest};
pub use cascade::{Cascade, Fallbacks, Tier, TierDescriptor};
pub use classifier::{is_retryable, DEFAULT_RETRYABLE_ERRORS};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{FlakeguardConfig, ReportingThresholds};
pub use error::{DriverError, DriverResult, ErrorDetails, ResilienceError};
pub use handler::ResilienceHandler;
pub use log::ErrorLog;
pub use model::{ErrorContext, ErrorReport, Resolution, RetryConfig, Target, Viewport};
pub use page::{collect_screenshot_metadata, ImageFormat, Page, ScreenshotMetadata, ScreenshotOptions};
pub use report::{ErrorAnalysisReport, ErrorStatistics, ErrorSummary, RecoveryBreakdown};

/// Flakeguard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
