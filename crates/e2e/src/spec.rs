//! Declarative YAML suite specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use flakeguard_core::{ConformanceLevel, Viewport};

use crate::error::{E2eError, E2eResult};

/// Pages to capture and audit, crossed with themes and viewports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Origin the page paths are resolved against
    pub base_url: String,

    /// Parallel workers; each owns its own resilience handler
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Theme variants, applied as the browser color scheme
    #[serde(default = "default_themes")]
    pub themes: Vec<String>,

    #[serde(default = "default_viewports")]
    pub viewports: Vec<Viewport>,

    /// Audit level unless a page overrides it
    #[serde(default)]
    pub conformance_level: ConformanceLevel,

    pub pages: Vec<PageSpec>,
}

fn default_workers() -> usize {
    2
}

fn default_themes() -> Vec<String> {
    vec!["light".to_string()]
}

fn default_viewports() -> Vec<Viewport> {
    vec![Viewport::new(1280, 720)]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    /// Artifact name
    pub name: String,

    /// Path relative to the suite base URL
    pub path: String,

    /// Selectors captured as separate element artifacts
    #[serde(default)]
    pub elements: Vec<String>,

    /// Capture a full-page screenshot
    #[serde(default = "default_true")]
    pub capture: bool,

    /// Run the accessibility audit
    #[serde(default = "default_true")]
    pub audit: bool,

    #[serde(default)]
    pub conformance_level: Option<ConformanceLevel>,
}

/// One page under one theme and viewport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub page: String,
    pub url: String,
    pub theme: String,
    pub viewport: Viewport,
    pub elements: Vec<String>,
    pub capture: bool,
    pub audit: Option<ConformanceLevel>,
}

impl Job {
    /// File stem shared by this job's artifacts
    pub fn artifact_stem(&self) -> String {
        format!("{}-{}-{}", self.page, self.theme, self.viewport)
    }
}

impl SuiteSpec {
    /// Parse a suite spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a suite spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load a single file, or every suite under a directory
    pub fn load_all(path: &Path) -> E2eResult<Vec<Self>> {
        if path.is_file() {
            return Ok(vec![Self::from_file(path)?]);
        }

        let mut specs = Vec::new();
        for entry in walkdir::WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        Ok(specs)
    }

    fn invalid(&self, reason: impl Into<String>) -> E2eError {
        E2eError::InvalidSuite {
            suite: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if self.workers == 0 {
            return Err(self.invalid("workers must be at least 1"));
        }
        if self.pages.is_empty() {
            return Err(self.invalid("no pages"));
        }
        if self.themes.is_empty() || self.viewports.is_empty() {
            return Err(self.invalid("themes and viewports must not be empty"));
        }
        if let Some(v) = self.viewports.iter().find(|v| v.width == 0 || v.height == 0) {
            return Err(self.invalid(format!("viewport {} has no area", v)));
        }
        if let Some(page) = self.pages.iter().find(|p| !p.path.starts_with('/')) {
            return Err(self.invalid(format!("path of page '{}' must start with '/'", page.name)));
        }
        Ok(())
    }

    /// Every page crossed with every theme and viewport, in declaration order
    pub fn jobs(&self) -> Vec<Job> {
        let base = self.base_url.trim_end_matches('/');
        let mut jobs = Vec::new();

        for page in &self.pages {
            for theme in &self.themes {
                for viewport in &self.viewports {
                    jobs.push(Job {
                        page: page.name.clone(),
                        url: format!("{}{}", base, page.path),
                        theme: theme.clone(),
                        viewport: *viewport,
                        elements: page.elements.clone(),
                        capture: page.capture,
                        audit: page
                            .audit
                            .then(|| page.conformance_level.unwrap_or(self.conformance_level)),
                    });
                }
            }
        }

        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
name: marketing-site
description: Landing and pricing pages
base_url: http://localhost:3000/
workers: 3
themes: [light, dark]
viewports:
  - width: 1280
    height: 720
  - width: 390
    height: 844
conformance_level: AAA
pages:
  - name: home
    path: /
    elements: ['#hero', 'nav']
  - name: pricing
    path: /pricing
    audit: false
"#;

    #[test]
    fn test_parse_suite() {
        let spec = SuiteSpec::from_yaml(SUITE).unwrap();
        assert_eq!(spec.name, "marketing-site");
        assert_eq!(spec.workers, 3);
        assert_eq!(spec.conformance_level, ConformanceLevel::AAA);
        assert_eq!(spec.pages[0].elements.len(), 2);
        assert!(spec.pages[0].capture);
        assert!(!spec.pages[1].audit);
    }

    #[test]
    fn test_jobs_cross_product() {
        let spec = SuiteSpec::from_yaml(SUITE).unwrap();
        let jobs = spec.jobs();
        assert_eq!(jobs.len(), 2 * 2 * 2);

        assert_eq!(jobs[0].url, "http://localhost:3000/");
        assert_eq!(jobs[0].audit, Some(ConformanceLevel::AAA));
        assert_eq!(jobs[0].artifact_stem(), "home-light-1280x720");
        assert_eq!(jobs[1].viewport, Viewport::new(390, 844));

        let pricing = jobs.iter().find(|j| j.page == "pricing").unwrap();
        assert_eq!(pricing.url, "http://localhost:3000/pricing");
        assert_eq!(pricing.audit, None);
    }

    #[test]
    fn test_defaults() {
        let yaml = r#"
name: minimal
base_url: http://localhost:8080
pages:
  - name: home
    path: /
"#;
        let spec = SuiteSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.workers, 2);
        assert_eq!(spec.themes, vec!["light"]);
        assert_eq!(spec.conformance_level, ConformanceLevel::AA);
        assert_eq!(spec.jobs().len(), 1);
    }

    #[test]
    fn test_rejects_relative_path() {
        let yaml = r#"
name: broken
base_url: http://localhost:8080
pages:
  - name: home
    path: home
"#;
        let err = SuiteSpec::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, E2eError::InvalidSuite { .. }));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let yaml = r#"
name: broken
base_url: http://localhost:8080
workers: 0
pages:
  - name: home
    path: /
"#;
        assert!(SuiteSpec::from_yaml(yaml).is_err());
    }
}
