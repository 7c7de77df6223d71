//! Accessibility audit results, scoring and the audit cascade

mod audit;
mod engine;
mod heuristics;

pub use audit::{
    audit_placeholder, validate_accessibility_tools, EngineScanTier, ManualCheckTier,
    PrecomputedTier, ToolAvailability, AUDIT_OPERATION,
};
pub use engine::{AccessibilityEngine, ConformanceLevel, RuleSelection, ScanOutcome};
pub use heuristics::{
    evaluate_inventory, ButtonFacts, ControlFacts, DomInventory, ImageFacts, NodeRef,
    INVENTORY_SCRIPT,
};

use serde::{Deserialize, Serialize};

/// Severity of a finding, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl Impact {
    /// Weight of one violation of this impact in the score
    pub fn weight(self) -> u32 {
        match self {
            Impact::Critical => 10,
            Impact::Serious => 7,
            Impact::Moderate => 4,
            Impact::Minor => 1,
        }
    }
}

/// Element affected by a violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationNode {
    /// CSS selector path
    pub target: String,
    /// Truncated outer HTML
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub impact: Impact,
    pub description: String,
    pub help: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    pub nodes: Vec<ViolationNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassedCheck {
    pub id: String,
    pub description: String,
    pub node_count: u32,
}

/// Which tier produced an audit result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// Full rule set at the requested conformance level
    Primary,
    /// Curated rule subset
    Fallback,
    /// DOM heuristics, no engine
    Manual,
    /// Nothing could run
    Placeholder,
}

impl std::fmt::Display for ResultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultSource::Primary => write!(f, "primary"),
            ResultSource::Fallback => write!(f, "fallback"),
            ResultSource::Manual => write!(f, "manual"),
            ResultSource::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// Audit result from whichever tier succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityFallbackResult {
    pub violations: Vec<Violation>,
    pub passes: Vec<PassedCheck>,
    /// 0-100, always `compute_score(violations, passes)`
    pub score: u8,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessibilityFallbackResult {
    pub fn new(violations: Vec<Violation>, passes: Vec<PassedCheck>, source: ResultSource) -> Self {
        let score = compute_score(&violations, &passes);
        Self {
            violations,
            passes,
            score,
            source,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn violation_count(&self, impact: Impact) -> usize {
        self.violations.iter().filter(|v| v.impact == impact).count()
    }
}

/// Weighted pass ratio.
///
/// `W` sums impact weights over violations, `P` sums pass node counts.
/// Nothing checked scores 0, no violations scores 100, otherwise
/// `round(100 * P / (P + W))`.
pub fn compute_score(violations: &[Violation], passes: &[PassedCheck]) -> u8 {
    let weighted: u64 = violations.iter().map(|v| v.impact.weight() as u64).sum();
    let passed: u64 = passes.iter().map(|p| p.node_count as u64).sum();

    match (weighted, passed) {
        (0, 0) => 0,
        (0, _) => 100,
        (w, p) => {
            let score = (100.0 * p as f64 / (p + w) as f64).round();
            score as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(impact: Impact) -> Violation {
        Violation {
            id: "rule".into(),
            impact,
            description: String::new(),
            help: String::new(),
            help_url: None,
            nodes: vec![],
        }
    }

    fn pass(node_count: u32) -> PassedCheck {
        PassedCheck {
            id: "check".into(),
            description: String::new(),
            node_count,
        }
    }

    #[test]
    fn test_score_two_passes_one_critical() {
        let score = compute_score(&[violation(Impact::Critical)], &[pass(1), pass(1)]);
        assert_eq!(score, 17);
    }

    #[test]
    fn test_score_nothing_checked() {
        assert_eq!(compute_score(&[], &[]), 0);
        assert_eq!(compute_score(&[], &[pass(0)]), 0);
    }

    #[test]
    fn test_score_no_violations() {
        assert_eq!(compute_score(&[], &[pass(3)]), 100);
    }

    #[test]
    fn test_score_only_violations() {
        assert_eq!(compute_score(&[violation(Impact::Minor)], &[]), 0);
    }

    #[test]
    fn test_score_mixed_weights() {
        // W = 7 + 4 + 1 = 12, P = 36 -> 75
        let violations = [
            violation(Impact::Serious),
            violation(Impact::Moderate),
            violation(Impact::Minor),
        ];
        assert_eq!(compute_score(&violations, &[pass(36)]), 75);
    }

    #[test]
    fn test_result_score_matches_formula() {
        let result = AccessibilityFallbackResult::new(
            vec![violation(Impact::Critical)],
            vec![pass(2)],
            ResultSource::Manual,
        );
        assert_eq!(result.score, compute_score(&result.violations, &result.passes));
        assert_eq!(result.violation_count(Impact::Critical), 1);
    }

    #[test]
    fn test_impact_ordering() {
        assert!(Impact::Critical > Impact::Serious);
        assert!(Impact::Moderate > Impact::Minor);
    }
}
