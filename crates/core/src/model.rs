//! Error model: per-attempt context, retry configuration and error reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::classifier::DEFAULT_RETRYABLE_ERRORS;
use crate::error::ErrorDetails;

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What an operation is acting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Page identifier (route name, story id, ...)
    pub page: String,

    /// Theme variant the page is rendered in
    pub theme: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl Target {
    pub fn new(page: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            theme: theme.into(),
            viewport: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Option<Viewport>) -> Self {
        self.viewport = viewport;
        self
    }
}

/// Context for a single attempt of a logical operation.
///
/// Values are never mutated once logged; every retry or fallback derives a
/// fresh context through [`ErrorContext::for_attempt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    pub target: Target,
    pub timestamp: DateTime<Utc>,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_retries: u32,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, target: Target, timestamp: DateTime<Utc>) -> Self {
        Self {
            operation: operation.into(),
            target,
            timestamp,
            attempt: 1,
            max_retries: RetryConfig::default().max_retries,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Derive the context for another attempt of the same operation
    pub fn for_attempt(&self, attempt: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            operation: self.operation.clone(),
            target: self.target.clone(),
            timestamp,
            attempt,
            max_retries: self.max_retries,
        }
    }
}

/// Exponential backoff settings for the retry executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_retries: u32,

    pub base_delay_ms: u64,

    /// Upper bound for any single backoff delay
    pub max_delay_ms: u64,

    pub backoff_multiplier: f64,

    /// Substrings matched against error name, message and type name
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// How an error was ultimately handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// A later attempt of the same operation succeeded
    Retry,
    /// A degraded strategy produced the result
    Fallback,
    /// The operation was not attempted
    Skip,
    /// Nothing recovered the operation
    Fail,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Retry => write!(f, "retry"),
            Resolution::Fallback => write!(f, "fallback"),
            Resolution::Skip => write!(f, "skip"),
            Resolution::Fail => write!(f, "fail"),
        }
    }
}

/// One logged outcome of an operation that hit an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub id: Uuid,
    pub context: ErrorContext,
    pub error: ErrorDetails,
    pub recovery_attempted: bool,
    pub recovery_successful: bool,
    pub resolution: Resolution,
    pub timestamp: DateTime<Utc>,
}
