//! Playwright browser automation
//!
//! Every page operation runs as a short Node script: launch the browser, open
//! the page, replay the prelude (injected styles and scripts, load-state
//! waits, settle delays), perform the operation and print one JSON line.
//! Playwright failures come back with their error name and message and are
//! mapped onto [`DriverError`] so the classifier can judge them.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use flakeguard_core::page::{ClipRect, LoadState, Page, ScreenshotOptions, FONTS_READY};
use flakeguard_core::{DriverError, DriverResult, ImageFormat, Viewport};

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    /// `light` or `dark`; other themes leave the browser default
    pub color_scheme: Option<String>,
    /// Upper bound on one script, browser start-up included
    pub script_timeout: Duration,
    pub node_binary: String,
    /// `NODE_PATH` for resolving `playwright` from the script directory
    pub node_path: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::new(1280, 720),
            color_scheme: None,
            script_timeout: Duration::from_secs(90),
            node_binary: "node".to_string(),
            node_path: None,
        }
    }
}

impl PlaywrightConfig {
    /// Browser color scheme for a theme name
    pub fn with_theme(mut self, theme: &str) -> Self {
        self.color_scheme = match theme {
            "light" | "dark" => Some(theme.to_string()),
            _ => None,
        };
        self
    }
}

static TIMEOUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Timeout (\d+)ms exceeded").expect("valid timeout regex"));

/// State replayed into every script after navigation
#[derive(Debug, Clone, PartialEq)]
enum PreludeStep {
    Style(String),
    Script(String),
    LoadState(LoadState, u64),
    FontsReady,
    Settle(u64),
}

/// Last line a script prints
#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// JavaScript string literal for `s`
fn js_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// A page at one URL, driven through stateless Playwright scripts
pub struct PlaywrightPage {
    config: PlaywrightConfig,
    url: String,
    prelude: Mutex<Vec<PreludeStep>>,
    workdir: tempfile::TempDir,
    counter: AtomicU64,
}

impl PlaywrightPage {
    pub fn open(config: PlaywrightConfig, url: impl Into<String>) -> E2eResult<Self> {
        Ok(Self {
            config,
            url: url.into(),
            prelude: Mutex::new(Vec::new()),
            workdir: tempfile::tempdir()?,
            counter: AtomicU64::new(0),
        })
    }

    /// Check if Playwright is installed
    pub fn check_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn target_url(&self) -> &str {
        &self.url
    }

    fn next_path(&self, extension: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.workdir.path().join(format!("op-{}.{}", n, extension))
    }

    /// Record a prelude step once; repeating a step adds nothing to later scripts
    fn remember(&self, step: PreludeStep) {
        let mut prelude = self.prelude.lock();
        if !prelude.contains(&step) {
            prelude.push(step);
        }
    }

    fn prelude_js(&self) -> String {
        self.prelude
            .lock()
            .iter()
            .map(|step| match step {
                PreludeStep::Style(css) => {
                    format!("    await page.addStyleTag({{ content: {} }});\n", js_str(css))
                }
                PreludeStep::Script(source) => {
                    format!("    await page.addScriptTag({{ content: {} }});\n", js_str(source))
                }
                PreludeStep::LoadState(state, timeout_ms) => format!(
                    "    await page.waitForLoadState({}, {{ timeout: {} }});\n",
                    js_str(state.as_str()),
                    timeout_ms
                ),
                PreludeStep::FontsReady => {
                    format!("    await page.evaluate({});\n", js_str(FONTS_READY))
                }
                PreludeStep::Settle(ms) => format!("    await page.waitForTimeout({});\n", ms),
            })
            .collect()
    }

    /// Build the Playwright script running `body` after navigation and prelude.
    /// `body` is the inside of an async function; its return value is reported.
    pub fn build_script(&self, body: &str) -> String {
        let mut context_options = json!({
            "viewport": {
                "width": self.config.viewport.width,
                "height": self.config.viewport.height,
            }
        });
        if let Some(scheme) = &self.config.color_scheme {
            context_options["colorScheme"] = Value::String(scheme.clone());
        }

        format!(
            r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  try {{
    const context = await browser.newContext({context_options});
    const page = await context.newPage();
    await page.goto({url}, {{ waitUntil: 'load' }});
{prelude}    const result = await (async () => {{
{body}
    }})();
    console.log(JSON.stringify({{ ok: true, result: result === undefined ? null : result }}));
  }} catch (error) {{
    console.log(JSON.stringify({{ ok: false, name: error.name, message: error.message }}));
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            context_options = context_options,
            url = js_str(&self.url),
            prelude = self.prelude_js(),
            body = body,
        )
    }

    /// Run `body` in a fresh page and return what it evaluated to
    async fn run(&self, body: &str) -> DriverResult<Value> {
        let script = self.build_script(body);
        let script_path = self.next_path("js");
        std::fs::write(&script_path, script)
            .map_err(|e| DriverError::Protocol(format!("cannot write script: {}", e)))?;

        debug!("Running Playwright script: {}", script_path.display());

        let mut command = TokioCommand::new(&self.config.node_binary);
        command
            .arg(&script_path)
            .current_dir(self.workdir.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &self.config.node_path {
            command.env("NODE_PATH", node_path);
        }
        let child = command
            .spawn()
            .map_err(|e| DriverError::Protocol(format!("cannot start node: {}", e)))?;

        let output = tokio::time::timeout(self.config.script_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                DriverError::timeout("playwright script", self.config.script_timeout.as_millis() as u64)
            })?
            .map_err(|e| DriverError::Protocol(format!("node did not finish: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let outcome = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<ScriptOutcome>(line).ok());

        match outcome {
            Some(outcome) if outcome.ok => Ok(outcome.result),
            Some(outcome) => Err(map_playwright_error(
                outcome.name.as_deref().unwrap_or("Error"),
                outcome.message.as_deref().unwrap_or("unknown error"),
            )),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("Playwright script produced no result: {}", stderr.trim());
                Err(map_playwright_error("Error", stderr.trim()))
            }
        }
    }

    async fn capture_to_file(
        &self,
        body_for_path: impl Fn(&str) -> String,
        format: ImageFormat,
    ) -> DriverResult<Vec<u8>> {
        let path = self.next_path(format.extension());
        let path_str = path.to_string_lossy().to_string();
        self.run(&body_for_path(&path_str)).await?;
        let bytes = std::fs::read(&path)
            .map_err(|e| DriverError::Protocol(format!("screenshot not written: {}", e)))?;
        let _ = std::fs::remove_file(&path);
        Ok(bytes)
    }
}

/// Playwright `screenshot()` options for a page or locator capture
pub fn screenshot_options_json(options: &ScreenshotOptions, path: &str, element: bool) -> Value {
    let animations = if options.disable_animations {
        "disabled"
    } else {
        "allow"
    };
    let mut out = json!({
        "path": path,
        "type": options.format.as_str(),
        "animations": animations,
    });
    if options.format == ImageFormat::Jpeg {
        if let Some(quality) = options.quality {
            out["quality"] = json!(quality);
        }
    }
    if let Some(timeout) = options.timeout_ms {
        out["timeout"] = json!(timeout);
    }
    if !element {
        out["fullPage"] = json!(options.full_page);
        if let Some(clip) = options.clip {
            out["clip"] = json!({
                "x": clip.x,
                "y": clip.y,
                "width": clip.width,
                "height": clip.height,
            });
        }
    }
    out
}

/// Map a Playwright error name and message onto a driver error
pub fn map_playwright_error(name: &str, message: &str) -> DriverError {
    let first_line = message.lines().next().unwrap_or("").to_string();

    if name == "TimeoutError" || (message.contains("Timeout ") && message.contains("exceeded")) {
        let timeout_ms = TIMEOUT_RE
            .captures(message)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        if message.starts_with("page.goto") || message.contains("navigation") {
            return DriverError::NavigationTimeout(first_line);
        }
        let operation = first_line.split(':').next().unwrap_or("playwright").to_string();
        return DriverError::timeout(operation, timeout_ms);
    }
    if message.contains("Target closed") || message.contains("has been closed") {
        return DriverError::TargetClosed(first_line);
    }
    if message.contains("crashed") {
        return DriverError::PageCrashed(first_line);
    }
    if message.contains("net::ERR") || message.contains("NS_ERROR") {
        return DriverError::Network(first_line);
    }
    if message.contains("Protocol error") {
        return DriverError::Protocol(first_line);
    }
    if message.contains("strict mode violation") || message.contains("not found") {
        return DriverError::ElementNotFound(first_line);
    }
    if matches!(name, "ReferenceError" | "TypeError" | "SyntaxError")
        || message.contains("Evaluation failed")
    {
        return DriverError::Evaluation(first_line);
    }
    DriverError::other(name, first_line)
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn url(&self) -> DriverResult<String> {
        let value = self.run("      return page.url();").await?;
        Ok(value.as_str().unwrap_or(&self.url).to_string())
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> DriverResult<Vec<u8>> {
        self.capture_to_file(
            |path| {
                format!(
                    "      await page.screenshot({});\n      return true;",
                    screenshot_options_json(options, path, false)
                )
            },
            options.format,
        )
        .await
    }

    async fn element_screenshot(
        &self,
        selector: &str,
        options: &ScreenshotOptions,
    ) -> DriverResult<Vec<u8>> {
        self.capture_to_file(
            |path| {
                format!(
                    "      await page.locator({}).first().screenshot({});\n      return true;",
                    js_str(selector),
                    screenshot_options_json(options, path, true)
                )
            },
            options.format,
        )
        .await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        self.run(&format!(
            "      await page.waitForSelector({}, {{ state: 'visible', timeout: {} }});\n      return true;",
            js_str(selector),
            timeout.as_millis()
        ))
        .await
        .map(|_| ())
    }

    async fn bounding_box(&self, selector: &str) -> DriverResult<Option<ClipRect>> {
        let value = self
            .run(&format!(
                "      return await page.locator({}).first().boundingBox();",
                js_str(selector)
            ))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| DriverError::Protocol(format!("unexpected bounding box: {}", e)))
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> DriverResult<()> {
        let timeout_ms = timeout.as_millis() as u64;
        self.run(&format!(
            "      await page.waitForLoadState({}, {{ timeout: {} }});\n      return true;",
            js_str(state.as_str()),
            timeout_ms
        ))
        .await?;
        self.remember(PreludeStep::LoadState(state, timeout_ms));
        Ok(())
    }

    async fn wait_for_fonts(&self) -> DriverResult<()> {
        self.remember(PreludeStep::FontsReady);
        Ok(())
    }

    async fn wait_for_timeout(&self, duration: Duration) {
        self.remember(PreludeStep::Settle(duration.as_millis() as u64));
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.run(&format!(
            "      return await page.evaluate({});",
            js_str(expression)
        ))
        .await
    }

    async fn add_style_tag(&self, css: &str) -> DriverResult<()> {
        self.remember(PreludeStep::Style(css.to_string()));
        Ok(())
    }

    async fn add_script_tag(&self, source: &str) -> DriverResult<()> {
        self.remember(PreludeStep::Script(source.to_string()));
        Ok(())
    }

    async fn viewport(&self) -> Option<Viewport> {
        Some(self.config.viewport)
    }

    async fn user_agent(&self) -> DriverResult<String> {
        let value = self.evaluate("navigator.userAgent").await?;
        Ok(value.as_str().unwrap_or("unknown").to_string())
    }

    fn browser_name(&self) -> String {
        self.config.browser.as_str().to_string()
    }
}
