//! Resilience handler: retry executor and error bookkeeping
//!
//! One handler instance belongs to one test worker. Every mutating method takes
//! `&mut self`, so a handler cannot be shared between concurrently running
//! workers; their logs are combined afterwards with [`ErrorLog::merge`].

use std::future::Future;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::backoff_delay;
use crate::classifier::is_retryable;
use crate::clock::{Clock, TokioClock};
use crate::config::FlakeguardConfig;
use crate::error::{DriverError, ErrorDetails, ResilienceError};
use crate::log::ErrorLog;
use crate::model::{ErrorContext, ErrorReport, Resolution, RetryConfig, Target};
use crate::report::{self, ErrorAnalysisReport, ErrorStatistics};

/// Runs flaky operations with retries and fallbacks and records how they ended
pub struct ResilienceHandler<C = TokioClock> {
    config: FlakeguardConfig,
    clock: C,
    log: ErrorLog,
}

impl ResilienceHandler<TokioClock> {
    pub fn new() -> Self {
        Self::with_config(FlakeguardConfig::default())
    }

    pub fn with_config(config: FlakeguardConfig) -> Self {
        Self::with_clock(config, TokioClock)
    }
}

impl Default for ResilienceHandler<TokioClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> ResilienceHandler<C> {
    pub fn with_clock(config: FlakeguardConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            log: ErrorLog::new(),
        }
    }

    pub fn config(&self) -> &FlakeguardConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    /// Hand the accumulated log over for merging
    pub fn into_log(self) -> ErrorLog {
        self.log
    }

    /// Fresh context for a new logical operation, stamped with the handler clock
    pub fn context(&self, operation: impl Into<String>, target: Target) -> ErrorContext {
        ErrorContext::new(operation, target, self.clock.now())
            .with_max_retries(self.config.retry.max_retries)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` attempts are used up.
    ///
    /// Between retryable failures the task sleeps on the handler clock for
    /// `min(base * multiplier^(n-1), max)`. At most one report is logged per
    /// call: a `retry` recovery when a later attempt succeeds, or a `fail` when
    /// the operation gives up.
    pub async fn execute_with_retry<T, F, Fut>(
        &mut self,
        context: &ErrorContext,
        config: Option<&RetryConfig>,
        mut operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let config = config.unwrap_or(&self.config.retry).clone();
        let max_attempts = config.max_retries.max(1);
        let mut last_error: Option<DriverError> = None;
        let mut attempt = 1;

        loop {
            let attempt_context = context
                .for_attempt(attempt, self.clock.now())
                .with_max_retries(max_attempts);

            match operation().await {
                Ok(value) => {
                    if let Some(error) = last_error.as_ref() {
                        info!(
                            "{} succeeded on attempt {}/{}",
                            context.operation, attempt, max_attempts
                        );
                        self.log_recovery(&attempt_context, error, Resolution::Retry, true);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !is_retryable(&error, &config.retryable_errors) {
                        warn!(
                            "{} failed with non-retryable {}: {}",
                            context.operation,
                            error.name(),
                            error
                        );
                        self.log_error(&attempt_context, &error, Resolution::Fail);
                        return Err(ResilienceError::Fatal(error));
                    }

                    if attempt >= max_attempts {
                        warn!(
                            "{} exhausted {} attempts: {}",
                            context.operation, max_attempts, error
                        );
                        self.log_error(&attempt_context, &error, Resolution::Fail);
                        return Err(ResilienceError::RetriesExhausted {
                            operation: context.operation.clone(),
                            attempts: attempt,
                            source: error,
                        });
                    }

                    let delay = backoff_delay(&config, attempt);
                    debug!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        context.operation, attempt, max_attempts, error, delay
                    );
                    self.clock.sleep(delay).await;

                    last_error = Some(error);
                    attempt += 1;
                }
            }
        }
    }

    /// Record an error outcome.
    ///
    /// Recovery counts as attempted when this was not the first attempt or a
    /// fallback took over, and as successful only for `fallback`.
    pub fn log_error(&mut self, context: &ErrorContext, error: &DriverError, resolution: Resolution) {
        let attempted = context.attempt > 1 || resolution == Resolution::Fallback;
        let successful = resolution == Resolution::Fallback;
        self.record(context, ErrorDetails::from(error), resolution, attempted, successful);
    }

    /// Record a recovery from `error`
    pub fn log_recovery(
        &mut self,
        context: &ErrorContext,
        error: &DriverError,
        resolution: Resolution,
        successful: bool,
    ) {
        self.record(context, ErrorDetails::from(error), resolution, true, successful);
    }

    fn record(
        &mut self,
        context: &ErrorContext,
        error: ErrorDetails,
        resolution: Resolution,
        recovery_attempted: bool,
        recovery_successful: bool,
    ) {
        debug!(
            "Recording {} for {} ({}/{}): {}",
            resolution, context.operation, context.target.page, context.target.theme, error.message
        );
        self.log.append(ErrorReport {
            id: Uuid::new_v4(),
            context: context.clone(),
            error,
            recovery_attempted,
            recovery_successful,
            resolution,
            timestamp: self.clock.now(),
        });
    }

    /// Summary, full report list and recommendations for everything logged so far
    pub fn generate_error_report(&self) -> ErrorAnalysisReport {
        report::analyze(&self.log, &self.config.reporting)
    }

    /// Per-operation and per-resolution counts plus the most frequent errors
    pub fn get_error_statistics(&self) -> ErrorStatistics {
        report::statistics(&self.log)
    }

    pub fn clear_error_reports(&mut self) {
        info!("Clearing {} error report(s)", self.log.len());
        self.log.clear();
    }
}
