//! Scripted page and engine doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use flakeguard_core::accessibility::{AccessibilityEngine, RuleSelection, ScanOutcome};
use flakeguard_core::page::{ClipRect, LoadState, Page, ScreenshotOptions};
use flakeguard_core::{
    DriverError, DriverResult, FlakeguardConfig, Impact, ManualClock, PassedCheck,
    ResilienceHandler, Violation, Viewport,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

pub fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 20, 14, 0, 0).unwrap())
}

pub fn handler(clock: &ManualClock) -> ResilienceHandler<ManualClock> {
    ResilienceHandler::with_clock(FlakeguardConfig::default(), clock.clone())
}

pub fn millis(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

pub fn timeout() -> DriverError {
    DriverError::timeout("page.screenshot", 30_000)
}

/// Page whose screenshot and evaluate results are scripted up front
pub struct FakePage {
    screenshots: Mutex<VecDeque<DriverResult<Vec<u8>>>>,
    default_screenshot: DriverResult<Vec<u8>>,
    element_screenshots: Mutex<VecDeque<DriverResult<Vec<u8>>>>,
    default_element_screenshot: DriverResult<Vec<u8>>,
    selector_error: Option<DriverError>,
    bounding_box: Option<ClipRect>,
    evaluations: Vec<(String, DriverResult<Value>)>,
    viewport: Option<Viewport>,
    screenshot_calls: Mutex<Vec<ScreenshotOptions>>,
    styles: Mutex<Vec<String>>,
    fonts_waits: Mutex<usize>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            screenshots: Mutex::new(VecDeque::new()),
            default_screenshot: Ok(b"page".to_vec()),
            element_screenshots: Mutex::new(VecDeque::new()),
            default_element_screenshot: Ok(b"element".to_vec()),
            selector_error: None,
            bounding_box: None,
            evaluations: Vec::new(),
            viewport: Some(Viewport::new(1280, 720)),
            screenshot_calls: Mutex::new(Vec::new()),
            styles: Mutex::new(Vec::new()),
            fonts_waits: Mutex::new(0),
        }
    }

    /// Results for successive page screenshots, before the default applies
    pub fn screenshots(self, results: Vec<DriverResult<Vec<u8>>>) -> Self {
        *self.screenshots.lock() = results.into();
        self
    }

    pub fn default_screenshot(mut self, result: DriverResult<Vec<u8>>) -> Self {
        self.default_screenshot = result;
        self
    }

    pub fn element_screenshots(self, results: Vec<DriverResult<Vec<u8>>>) -> Self {
        *self.element_screenshots.lock() = results.into();
        self
    }

    pub fn default_element_screenshot(mut self, result: DriverResult<Vec<u8>>) -> Self {
        self.default_element_screenshot = result;
        self
    }

    pub fn selector_error(mut self, error: DriverError) -> Self {
        self.selector_error = Some(error);
        self
    }

    pub fn bounding_box(mut self, rect: ClipRect) -> Self {
        self.bounding_box = Some(rect);
        self
    }

    /// Answer any expression containing `needle` with `result`
    pub fn on_evaluate(mut self, needle: &str, result: DriverResult<Value>) -> Self {
        self.evaluations.push((needle.to_string(), result));
        self
    }

    pub fn screenshot_calls(&self) -> Vec<ScreenshotOptions> {
        self.screenshot_calls.lock().clone()
    }

    pub fn styles(&self) -> Vec<String> {
        self.styles.lock().clone()
    }

    pub fn fonts_waits(&self) -> usize {
        *self.fonts_waits.lock()
    }
}

#[async_trait]
impl Page for FakePage {
    async fn url(&self) -> DriverResult<String> {
        Ok("http://localhost:3000/".to_string())
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> DriverResult<Vec<u8>> {
        self.screenshot_calls.lock().push(options.clone());
        let next = self.screenshots.lock().pop_front();
        next.unwrap_or_else(|| self.default_screenshot.clone())
    }

    async fn element_screenshot(
        &self,
        _selector: &str,
        _options: &ScreenshotOptions,
    ) -> DriverResult<Vec<u8>> {
        let next = self.element_screenshots.lock().pop_front();
        next.unwrap_or_else(|| self.default_element_screenshot.clone())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> DriverResult<()> {
        match &self.selector_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn bounding_box(&self, _selector: &str) -> DriverResult<Option<ClipRect>> {
        Ok(self.bounding_box)
    }

    async fn wait_for_load_state(&self, _state: LoadState, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn wait_for_timeout(&self, _duration: Duration) {}

    async fn wait_for_fonts(&self) -> DriverResult<()> {
        *self.fonts_waits.lock() += 1;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.evaluations
            .iter()
            .find(|(needle, _)| expression.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or(Ok(Value::Bool(true)))
    }

    async fn add_style_tag(&self, css: &str) -> DriverResult<()> {
        self.styles.lock().push(css.to_string());
        Ok(())
    }

    async fn add_script_tag(&self, _source: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    async fn user_agent(&self) -> DriverResult<String> {
        Ok("FakeBrowser/1.0".to_string())
    }

    fn browser_name(&self) -> String {
        "fake".to_string()
    }
}

/// Engine with scripted probe and scan results
pub struct FakeEngine {
    loaded: DriverResult<bool>,
    full_scans: Mutex<VecDeque<DriverResult<ScanOutcome>>>,
    default_full_scan: DriverResult<ScanOutcome>,
    reduced_scan: DriverResult<ScanOutcome>,
    selections: Mutex<Vec<RuleSelection>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            loaded: Ok(true),
            full_scans: Mutex::new(VecDeque::new()),
            default_full_scan: Ok(ScanOutcome::default()),
            reduced_scan: Ok(ScanOutcome::default()),
            selections: Mutex::new(Vec::new()),
        }
    }

    pub fn loaded(mut self, loaded: DriverResult<bool>) -> Self {
        self.loaded = loaded;
        self
    }

    pub fn full_scans(self, results: Vec<DriverResult<ScanOutcome>>) -> Self {
        *self.full_scans.lock() = results.into();
        self
    }

    pub fn default_full_scan(mut self, result: DriverResult<ScanOutcome>) -> Self {
        self.default_full_scan = result;
        self
    }

    pub fn reduced_scan(mut self, result: DriverResult<ScanOutcome>) -> Self {
        self.reduced_scan = result;
        self
    }

    /// Every selection scanned, in call order
    pub fn selections(&self) -> Vec<RuleSelection> {
        self.selections.lock().clone()
    }
}

#[async_trait]
impl AccessibilityEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake-axe"
    }

    async fn is_loaded(&self, _page: &dyn Page) -> DriverResult<bool> {
        self.loaded.clone()
    }

    async fn scan(&self, _page: &dyn Page, selection: &RuleSelection) -> DriverResult<ScanOutcome> {
        self.selections.lock().push(selection.clone());
        match selection {
            RuleSelection::Tags(_) => {
                let next = self.full_scans.lock().pop_front();
                next.unwrap_or_else(|| self.default_full_scan.clone())
            }
            RuleSelection::Rules(_) => self.reduced_scan.clone(),
        }
    }
}

/// Scan outcome with one violation per impact and one pass per node count
pub fn outcome(impacts: &[Impact], pass_nodes: &[u32]) -> ScanOutcome {
    ScanOutcome {
        violations: impacts
            .iter()
            .enumerate()
            .map(|(i, impact)| Violation {
                id: format!("rule-{}", i),
                impact: *impact,
                description: "scripted violation".to_string(),
                help: "fix it".to_string(),
                help_url: None,
                nodes: Vec::new(),
            })
            .collect(),
        passes: pass_nodes
            .iter()
            .enumerate()
            .map(|(i, count)| PassedCheck {
                id: format!("check-{}", i),
                description: "scripted pass".to_string(),
                node_count: *count,
            })
            .collect(),
    }
}
