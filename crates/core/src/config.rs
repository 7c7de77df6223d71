//! Framework configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::accessibility::ConformanceLevel;
use crate::model::RetryConfig;

/// Top-level configuration for a resilience handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlakeguardConfig {
    /// Retry policy for captures and ad-hoc operations
    pub retry: RetryConfig,

    /// Retry policy for the primary accessibility scan
    pub audit_retry: RetryConfig,

    pub capture: CaptureConfig,

    pub audit: AuditConfig,

    pub reporting: ReportingThresholds,
}

impl Default for FlakeguardConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            // Scanners fail fast; long retry loops only add wall time.
            audit_retry: RetryConfig::default().with_max_retries(2),
            capture: CaptureConfig::default(),
            audit: AuditConfig::default(),
            reporting: ReportingThresholds::default(),
        }
    }
}

/// Timeouts and quality settings for the capture tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Wait for network idle before the primary capture
    pub network_idle_timeout_ms: u64,

    /// Fixed delay after style overrides are injected
    pub settle_delay_ms: u64,

    pub primary_timeout_ms: u64,

    pub reduced_timeout_ms: u64,

    pub viewport_timeout_ms: u64,

    pub emergency_timeout_ms: u64,

    /// JPEG quality used by the reduced tiers (0-100)
    pub jpeg_quality: u8,

    /// Locator wait for the first element tier
    pub element_wait_ms: u64,

    /// Locator wait for the second element tier
    pub element_extended_wait_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            network_idle_timeout_ms: 10_000,
            settle_delay_ms: 500,
            primary_timeout_ms: 30_000,
            reduced_timeout_ms: 15_000,
            viewport_timeout_ms: 10_000,
            emergency_timeout_ms: 5_000,
            jpeg_quality: 80,
            element_wait_ms: 10_000,
            element_extended_wait_ms: 15_000,
        }
    }
}

impl CaptureConfig {
    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Accessibility audit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub default_level: ConformanceLevel,

    /// Curated rule ids for the reduced automatic scan
    pub reduced_rules: Vec<String>,

    /// Probe the engine before scanning and skip engine tiers when it is missing
    pub probe_before_scan: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_level: ConformanceLevel::AA,
            reduced_rules: ["color-contrast", "image-alt", "label", "button-name", "link-name"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            probe_before_scan: true,
        }
    }
}

/// Thresholds behind the report recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingThresholds {
    /// Recovery rate (percent) below which retry tuning is suggested
    pub min_recovery_rate: f64,

    /// Capture reports above which capture fixes are suggested
    pub capture_error_limit: usize,

    /// Audit reports above which audit fixes are suggested
    pub audit_error_limit: usize,

    /// Share of `fail` resolutions (percent) above which more tiers are suggested
    pub max_failure_share: f64,
}

impl Default for ReportingThresholds {
    fn default() -> Self {
        Self {
            min_recovery_rate: 50.0,
            capture_error_limit: 5,
            audit_error_limit: 3,
            max_failure_share: 30.0,
        }
    }
}

impl FlakeguardConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = FlakeguardConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.audit_retry.max_retries, 2);
        assert_eq!(config.capture.jpeg_quality, 80);
        assert_eq!(config.audit.default_level, ConformanceLevel::AA);
        assert_eq!(config.reporting.capture_error_limit, 5);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = FlakeguardConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, FlakeguardConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/flakeguard.toml");

        let mut config = FlakeguardConfig::default();
        config.retry.max_retries = 5;
        config.audit.default_level = ConformanceLevel::AAA;
        config.save(&path).unwrap();

        let loaded = FlakeguardConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let config: FlakeguardConfig = toml::from_str(
            r#"
[capture]
settle_delay_ms = 0

[audit]
default_level = "A"
"#,
        )
        .unwrap();
        assert_eq!(config.capture.settle_delay_ms, 0);
        assert_eq!(config.capture.primary_timeout_ms, 30_000);
        assert_eq!(config.audit.default_level, ConformanceLevel::A);
        assert_eq!(config.audit_retry.max_retries, 2);
    }
}
