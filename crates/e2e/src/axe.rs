//! axe-core accessibility engine driven through `Page::evaluate`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use flakeguard_core::accessibility::{AccessibilityEngine, RuleSelection, ScanOutcome};
use flakeguard_core::page::Page;
use flakeguard_core::{DriverError, DriverResult, Impact, PassedCheck, Violation, ViolationNode};

use crate::error::E2eResult;

const LOADED_PROBE: &str = "typeof window.axe !== 'undefined' && typeof window.axe.run === 'function'";

/// Longest HTML snippet kept per node
const MAX_HTML: usize = 200;

/// axe-core, either already bundled by the app or injected from a source file
pub struct AxeEngine {
    source: Option<String>,
}

impl AxeEngine {
    /// Engine expected to be present in the page already
    pub fn bundled() -> Self {
        Self { source: None }
    }

    /// Engine injected from `axe.min.js` contents when the page lacks it
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let source = std::fs::read_to_string(path)?;
        info!("Loaded axe-core from {} ({} bytes)", path.display(), source.len());
        Ok(Self::with_source(source))
    }

    async fn probe(&self, page: &dyn Page) -> DriverResult<bool> {
        Ok(page.evaluate(LOADED_PROBE).await?.as_bool().unwrap_or(false))
    }

    /// Inject the source when the engine is missing and we have it
    async fn ensure_loaded(&self, page: &dyn Page) -> DriverResult<bool> {
        if self.probe(page).await? {
            return Ok(true);
        }
        match &self.source {
            Some(source) => {
                debug!("Injecting axe-core into the page");
                page.add_script_tag(source).await?;
                self.probe(page).await
            }
            None => Ok(false),
        }
    }
}

/// `axe.run` call for a selection, resolving to `{ violations, passes }`
pub fn run_expression(selection: &RuleSelection) -> String {
    let run_only = match selection {
        RuleSelection::Tags(tags) => json!({ "type": "tag", "values": tags }),
        RuleSelection::Rules(rules) => json!({ "type": "rule", "values": rules }),
    };
    format!(
        "axe.run(document, {{ runOnly: {}, resultTypes: ['violations', 'passes'] }})\
         .then(r => ({{ violations: r.violations, passes: r.passes }}))",
        run_only
    )
}

#[derive(Debug, Deserialize)]
struct RawResults {
    #[serde(default)]
    violations: Vec<RawRule>,
    #[serde(default)]
    passes: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRule {
    id: String,
    #[serde(default)]
    impact: Option<Impact>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    help: String,
    #[serde(default)]
    help_url: Option<String>,
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    /// Selector path; nested arrays for frames and shadow roots
    #[serde(default)]
    target: Vec<Value>,
    #[serde(default)]
    html: String,
}

impl RawNode {
    fn into_node(self) -> ViolationNode {
        let target = self
            .target
            .iter()
            .map(|t| match t {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        let html = match self.html.char_indices().nth(MAX_HTML) {
            Some((cut, _)) => self.html[..cut].to_string(),
            None => self.html,
        };
        ViolationNode { target, html }
    }
}

/// Convert raw `axe.run` results into violations and passes
pub fn parse_results(raw: Value) -> DriverResult<ScanOutcome> {
    let results: RawResults = serde_json::from_value(raw)
        .map_err(|e| DriverError::Evaluation(format!("unexpected axe results: {}", e)))?;

    let violations = results
        .violations
        .into_iter()
        .map(|rule| Violation {
            id: rule.id,
            // axe leaves impact null only for incomplete checks
            impact: rule.impact.unwrap_or(Impact::Moderate),
            description: rule.description,
            help: rule.help,
            help_url: rule.help_url,
            nodes: rule.nodes.into_iter().map(RawNode::into_node).collect(),
        })
        .collect();

    let passes = results
        .passes
        .into_iter()
        .map(|rule| PassedCheck {
            id: rule.id,
            description: rule.description,
            node_count: rule.nodes.len() as u32,
        })
        .collect();

    Ok(ScanOutcome { violations, passes })
}

#[async_trait]
impl AccessibilityEngine for AxeEngine {
    fn name(&self) -> &str {
        "axe-core"
    }

    async fn is_loaded(&self, page: &dyn Page) -> DriverResult<bool> {
        self.ensure_loaded(page).await
    }

    async fn scan(&self, page: &dyn Page, selection: &RuleSelection) -> DriverResult<ScanOutcome> {
        if !self.ensure_loaded(page).await? {
            return Err(DriverError::EngineUnavailable(
                "axe is not loaded in the page".to_string(),
            ));
        }
        let raw = page.evaluate(&run_expression(selection)).await?;
        parse_results(raw)
    }
}
