//! Exponential backoff schedule

use std::time::Duration;

use crate::model::RetryConfig;

/// Delay to wait after failed attempt `attempt` (1-based):
/// `min(base * multiplier^(attempt - 1), max)`
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped = raw.min(config.max_delay_ms as f64).max(0.0);
    Duration::from_millis(capped.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 1000 ; "first retry waits the base delay")]
    #[test_case(2, 2000 ; "second retry doubles")]
    #[test_case(3, 4000 ; "third retry")]
    #[test_case(4, 8000 ; "fourth retry")]
    #[test_case(5, 16000 ; "fifth retry")]
    #[test_case(6, 30000 ; "sixth retry is capped")]
    #[test_case(7, 30000 ; "stays capped")]
    #[test_case(64, 30000 ; "large attempt does not overflow")]
    fn test_default_schedule(attempt: u32, expected_ms: u64) {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(&config, attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_custom_multiplier() {
        let config = RetryConfig {
            base_delay_ms: 100,
            backoff_multiplier: 3.0,
            max_delay_ms: 1000,
            ..Default::default()
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(300));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(900));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(1000));
    }
}
