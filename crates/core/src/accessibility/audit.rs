//! Accessibility audit cascade and engine capability probe

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::engine::{AccessibilityEngine, ConformanceLevel, RuleSelection};
use super::heuristics::{evaluate_inventory, DomInventory, INVENTORY_SCRIPT};
use super::{AccessibilityFallbackResult, Impact, ResultSource, Violation};
use crate::cascade::{CascadeFailure, CascadeSuccess, Fallbacks, Tier, TierDescriptor};
use crate::clock::Clock;
use crate::error::{DriverError, DriverResult};
use crate::handler::ResilienceHandler;
use crate::model::{ErrorContext, Resolution, Target};
use crate::page::Page;

pub const AUDIT_OPERATION: &str = "accessibility_audit";

const DOM_PROBE: &str = "document.querySelectorAll('body *').length >= 0";

const FULL_SCAN: TierDescriptor = TierDescriptor::new("full-scan", 100, 100);
const REDUCED_SCAN: TierDescriptor = TierDescriptor::new("reduced-scan", 60, 50);
const MANUAL_CHECKS: TierDescriptor = TierDescriptor::new("manual-checks", 30, 20);

/// What the capability probe found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAvailability {
    pub engine_loaded: bool,
    pub dom_query_works: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolAvailability {
    /// Engine scans are worth attempting
    pub fn engine_usable(&self) -> bool {
        self.engine_loaded && self.dom_query_works
    }
}

/// Check independently whether the engine is loaded and the DOM can be queried
pub async fn validate_accessibility_tools(
    page: &dyn Page,
    engine: &dyn AccessibilityEngine,
) -> ToolAvailability {
    let mut errors = Vec::new();

    let engine_loaded = match engine.is_loaded(page).await {
        Ok(loaded) => loaded,
        Err(e) => {
            errors.push(format!("{}: {}", engine.name(), e));
            false
        }
    };

    let dom_query_works = match page.evaluate(DOM_PROBE).await {
        Ok(value) => value.as_bool().unwrap_or(false),
        Err(e) => {
            errors.push(format!("DOM query: {}", e));
            false
        }
    };

    ToolAvailability {
        engine_loaded,
        dom_query_works,
        error: (!errors.is_empty()).then(|| errors.join("; ")),
    }
}

/// Result for an audit where nothing could run: one critical violation
/// carrying the cause, score 0
pub fn audit_placeholder(message: &str) -> AccessibilityFallbackResult {
    let violation = Violation {
        id: "audit-failed".to_string(),
        impact: Impact::Critical,
        description: format!("Accessibility audit could not run: {}", message),
        help: "Check that the page loads and the accessibility engine can be injected".to_string(),
        help_url: None,
        nodes: Vec::new(),
    };
    AccessibilityFallbackResult::new(vec![violation], Vec::new(), ResultSource::Placeholder)
        .with_error(message)
}

/// Engine scan over a rule selection
pub struct EngineScanTier<'e> {
    descriptor: TierDescriptor,
    engine: &'e dyn AccessibilityEngine,
    selection: RuleSelection,
    source: ResultSource,
}

impl<'e> EngineScanTier<'e> {
    pub fn new(
        descriptor: TierDescriptor,
        engine: &'e dyn AccessibilityEngine,
        selection: RuleSelection,
        source: ResultSource,
    ) -> Self {
        Self {
            descriptor,
            engine,
            selection,
            source,
        }
    }
}

#[async_trait]
impl<'e> Tier for EngineScanTier<'e> {
    type Output = AccessibilityFallbackResult;

    fn descriptor(&self) -> TierDescriptor {
        self.descriptor
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<AccessibilityFallbackResult> {
        let outcome = self.engine.scan(page, &self.selection).await?;
        Ok(AccessibilityFallbackResult::new(
            outcome.violations,
            outcome.passes,
            self.source,
        ))
    }
}

/// Tier whose outcome was computed ahead of time
pub struct PrecomputedTier<T> {
    descriptor: TierDescriptor,
    outcome: DriverResult<T>,
}

impl<T> PrecomputedTier<T> {
    pub fn new(descriptor: TierDescriptor, outcome: DriverResult<T>) -> Self {
        Self {
            descriptor,
            outcome,
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> Tier for PrecomputedTier<T> {
    type Output = T;

    fn descriptor(&self) -> TierDescriptor {
        self.descriptor
    }

    async fn attempt(&self, _page: &dyn Page) -> DriverResult<T> {
        self.outcome.clone()
    }
}

/// DOM heuristics without the engine
pub struct ManualCheckTier {
    descriptor: TierDescriptor,
}

impl ManualCheckTier {
    pub fn new() -> Self {
        Self {
            descriptor: MANUAL_CHECKS,
        }
    }
}

impl Default for ManualCheckTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tier for ManualCheckTier {
    type Output = AccessibilityFallbackResult;

    fn descriptor(&self) -> TierDescriptor {
        self.descriptor
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<AccessibilityFallbackResult> {
        let raw = page.evaluate(INVENTORY_SCRIPT).await?;
        let inventory: DomInventory = serde_json::from_value(raw)
            .map_err(|e| DriverError::Evaluation(format!("malformed DOM inventory: {}", e)))?;
        let (violations, passes) = evaluate_inventory(&inventory);
        Ok(AccessibilityFallbackResult::new(
            violations,
            passes,
            ResultSource::Manual,
        ))
    }
}

impl<C: Clock> ResilienceHandler<C> {
    /// Audit the page, degrading from a full engine scan through a reduced
    /// rule set and DOM heuristics down to a placeholder. Never fails.
    ///
    /// The reduced scan runs concurrently with the primary scan and its outcome
    /// is only used when the primary gives up. When the capability probe finds
    /// the engine unusable a `skip` report is logged and only the heuristics run.
    pub async fn run_audit_with_fallbacks(
        &mut self,
        page: &dyn Page,
        engine: &dyn AccessibilityEngine,
        name: &str,
        theme: &str,
        level: Option<ConformanceLevel>,
    ) -> AccessibilityFallbackResult {
        let level = level.unwrap_or(self.config().audit.default_level);
        let target = Target::new(name, theme).with_viewport(page.viewport().await);
        let context = self.context(AUDIT_OPERATION, target);

        if self.config().audit.probe_before_scan {
            let tools = validate_accessibility_tools(page, engine).await;
            if !tools.engine_usable() {
                let reason = DriverError::EngineUnavailable(
                    tools
                        .error
                        .unwrap_or_else(|| format!("{} is not loaded", engine.name())),
                );
                warn!(
                    "Skipping {} scans for '{}' ({}): {}",
                    engine.name(),
                    name,
                    theme,
                    reason
                );
                self.log_error(&context, &reason, Resolution::Skip);

                let manual_only = Fallbacks::new().tier(ManualCheckTier::new());
                let outcome = manual_only.run(self, &context, page, reason.clone()).await;
                return self.finish_audit(&context, Some(&reason), outcome);
            }
        }

        let primary = EngineScanTier::new(FULL_SCAN, engine, level.selection(), ResultSource::Primary);
        let reduced = EngineScanTier::new(
            REDUCED_SCAN,
            engine,
            RuleSelection::Rules(self.config().audit.reduced_rules.clone()),
            ResultSource::Fallback,
        );
        let retry = self.config().audit_retry.clone();

        debug!(
            "Auditing '{}' ({}) at level {:?} with {}",
            name,
            theme,
            level,
            engine.name()
        );
        let reduced_scan = reduced.attempt(page);
        let (primary_outcome, reduced_outcome) = futures::join!(
            self.execute_with_retry(&context, Some(&retry), || primary.attempt(page)),
            reduced_scan
        );

        let (outcome, trigger) = match primary_outcome {
            Ok(value) => {
                let success = CascadeSuccess {
                    value,
                    tier: 0,
                    descriptor: FULL_SCAN,
                };
                (Ok(success), None)
            }
            Err(e) => {
                let trigger = e.into_driver_error();
                warn!(
                    "Full scan failed for '{}' ({}), falling back: {}",
                    name, theme, trigger
                );
                let fallbacks = Fallbacks::new()
                    .tier(PrecomputedTier::new(REDUCED_SCAN, reduced_outcome))
                    .tier(ManualCheckTier::new());
                let outcome = fallbacks.run(self, &context, page, trigger.clone()).await;
                (outcome, Some(trigger))
            }
        };
        self.finish_audit(&context, trigger.as_ref(), outcome)
    }

    /// `trigger` is the error that sent the audit down the fallback chain. A
    /// placeholder names it first and adds the last fallback error when that differs.
    fn finish_audit(
        &mut self,
        context: &ErrorContext,
        trigger: Option<&DriverError>,
        outcome: Result<CascadeSuccess<AccessibilityFallbackResult>, CascadeFailure>,
    ) -> AccessibilityFallbackResult {
        match outcome {
            Ok(success) => {
                info!(
                    "Audit of '{}' ({}) scored {} from {} ({} violations)",
                    context.target.page,
                    context.target.theme,
                    success.value.score,
                    success.value.source,
                    success.value.violations.len()
                );
                success.value
            }
            Err(failure) => {
                error!(
                    "Every audit tier failed for '{}' ({}): {}",
                    context.target.page, context.target.theme, failure.error
                );
                let final_context =
                    context.for_attempt(failure.tiers_attempted as u32, self.clock().now());
                let trigger = trigger.unwrap_or(&failure.error);
                self.log_error(&final_context, trigger, Resolution::Fail);
                let message = if failure.error == *trigger {
                    trigger.to_string()
                } else {
                    format!("{} (last fallback: {})", trigger, failure.error)
                };
                audit_placeholder(&message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_scores_zero() {
        let result = audit_placeholder("axe is not defined");
        assert_eq!(result.source, ResultSource::Placeholder);
        assert_eq!(result.score, 0);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].impact, Impact::Critical);
        assert!(result.violations[0].description.contains("axe is not defined"));
        assert_eq!(result.error.as_deref(), Some("axe is not defined"));
    }

    #[test]
    fn test_engine_usable_needs_both() {
        let tools = ToolAvailability {
            engine_loaded: true,
            dom_query_works: false,
            error: None,
        };
        assert!(!tools.engine_usable());
    }
}
