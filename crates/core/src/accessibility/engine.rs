//! Pluggable accessibility scanning engine

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{PassedCheck, Violation};
use crate::error::DriverResult;
use crate::page::Page;

/// WCAG conformance level to scan for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConformanceLevel {
    A,
    #[default]
    AA,
    AAA,
}

impl ConformanceLevel {
    /// Rule tags covering this level; stricter levels include the looser ones
    pub fn tags(self) -> Vec<&'static str> {
        let mut tags = vec!["wcag2a", "wcag21a"];
        if matches!(self, ConformanceLevel::AA | ConformanceLevel::AAA) {
            tags.extend(["wcag2aa", "wcag21aa"]);
        }
        if self == ConformanceLevel::AAA {
            tags.extend(["wcag2aaa", "wcag21aaa"]);
        }
        tags
    }

    pub fn selection(self) -> RuleSelection {
        RuleSelection::Tags(self.tags().into_iter().map(String::from).collect())
    }
}

impl std::str::FromStr for ConformanceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(ConformanceLevel::A),
            "AA" => Ok(ConformanceLevel::AA),
            "AAA" => Ok(ConformanceLevel::AAA),
            other => Err(format!("unknown conformance level: {}", other)),
        }
    }
}

/// Which rules a scan runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum RuleSelection {
    /// Every rule carrying one of these tags
    Tags(Vec<String>),
    /// Exactly these rule ids
    Rules(Vec<String>),
}

/// Raw findings of one engine scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub violations: Vec<Violation>,
    pub passes: Vec<PassedCheck>,
}

/// Automated rule engine driven through a page
#[async_trait]
pub trait AccessibilityEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine is present in the page
    async fn is_loaded(&self, page: &dyn Page) -> DriverResult<bool>;

    async fn scan(&self, page: &dyn Page, selection: &RuleSelection) -> DriverResult<ScanOutcome>;
}
