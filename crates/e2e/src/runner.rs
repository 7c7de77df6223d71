//! Suite runner: fans jobs out to parallel workers and merges their error logs
//!
//! ```text
//!   SuiteSpec ──jobs()──▶ round-robin partition
//!                           │
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//!    worker 0           worker 1           worker N     (own ResilienceHandler each)
//!        │                  │                  │
//!        └──────── ErrorLog::merge ────────────┘
//!                           │
//!                 analyze + statistics ──▶ flakeguard-report.json
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use flakeguard_core::capture::{detect_format, CaptureRequest, PLACEHOLDER_PNG};
use flakeguard_core::report::{self, ErrorAnalysisReport, ErrorStatistics};
use flakeguard_core::{
    validate_screenshot, AccessibilityFallbackResult, ErrorLog, FlakeguardConfig, ImageFormat,
    ResilienceHandler, ResultSource, Viewport,
};

use crate::axe::AxeEngine;
use crate::error::{E2eError, E2eResult};
use crate::playwright::{PlaywrightConfig, PlaywrightPage};
use crate::spec::{Job, SuiteSpec};

pub const REPORT_FILE: &str = "flakeguard-report.json";

/// One written screenshot artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub path: PathBuf,
    pub sha256: String,
    pub size: usize,
    /// Decodes to a non-empty image
    pub valid: bool,
    /// Every tier failed and the placeholder was written
    pub placeholder: bool,
}

/// Outcome of one page/theme/viewport job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub page: String,
    pub theme: String,
    pub viewport: Viewport,
    pub worker: usize,
    pub duration_ms: u64,
    pub artifacts: Vec<ArtifactRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AccessibilityFallbackResult>,
    /// The job could not start at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// Some artifact or the audit came from a placeholder
    pub fn degraded(&self) -> bool {
        self.artifacts.iter().any(|a| a.placeholder)
            || self
                .audit
                .as_ref()
                .map_or(false, |a| a.source == ResultSource::Placeholder)
    }
}

/// Result of running a whole suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub workers: usize,
    pub jobs: Vec<JobResult>,
    pub analysis: ErrorAnalysisReport,
    pub statistics: ErrorStatistics,
}

impl SuiteReport {
    pub fn failed_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.error.is_some()).count()
    }

    pub fn degraded_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.degraded()).count()
    }
}

/// Configuration for the suite runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub resilience: FlakeguardConfig,
    pub playwright: PlaywrightConfig,
    /// Overrides the suite's worker count
    pub workers: Option<usize>,
    pub output_dir: PathBuf,
    /// axe-core source injected into pages lacking it
    pub axe_source: Option<PathBuf>,
    /// Wait for the base URL to answer before starting
    pub health_check: bool,
    pub health_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            resilience: FlakeguardConfig::default(),
            playwright: PlaywrightConfig::default(),
            workers: None,
            output_dir: PathBuf::from("test-results"),
            axe_source: None,
            health_check: true,
            health_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared, read-only inputs of every worker
struct WorkerContext {
    resilience: FlakeguardConfig,
    playwright: PlaywrightConfig,
    engine: AxeEngine,
    artifact_dir: PathBuf,
}

/// Split jobs round-robin over at most `workers` non-empty lanes
pub fn partition(jobs: Vec<Job>, workers: usize) -> Vec<Vec<Job>> {
    let lanes = workers.max(1).min(jobs.len().max(1));
    let mut out: Vec<Vec<Job>> = (0..lanes).map(|_| Vec::new()).collect();
    for (i, job) in jobs.into_iter().enumerate() {
        out[i % lanes].push(job);
    }
    out.retain(|lane| !lane.is_empty());
    out
}

/// Hex SHA-256 of `bytes`
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// File-name-safe form of a selector
fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn write_artifact(
    dir: &Path,
    name: &str,
    selector: Option<&str>,
    bytes: &[u8],
) -> E2eResult<ArtifactRecord> {
    // Unrecognised bytes keep the .png name
    let extension = detect_format(bytes).unwrap_or(ImageFormat::Png).extension();
    let path = dir.join(format!("{}.{}", name, extension));
    std::fs::write(&path, bytes)?;
    Ok(ArtifactRecord {
        name: name.to_string(),
        selector: selector.map(String::from),
        path,
        sha256: digest(bytes),
        size: bytes.len(),
        valid: validate_screenshot(bytes),
        placeholder: bytes == PLACEHOLDER_PNG.as_slice(),
    })
}

async fn run_job(
    handler: &mut ResilienceHandler,
    ctx: &WorkerContext,
    job: &Job,
) -> E2eResult<(Vec<ArtifactRecord>, Option<AccessibilityFallbackResult>)> {
    let config = PlaywrightConfig {
        viewport: job.viewport,
        ..ctx.playwright.clone()
    }
    .with_theme(&job.theme);
    let page = PlaywrightPage::open(config, &job.url)?;
    let stem = job.artifact_stem();
    let mut artifacts = Vec::new();

    if job.capture {
        let bytes = handler
            .capture_with_fallbacks(&page, &job.page, &job.theme, None)
            .await;
        artifacts.push(write_artifact(&ctx.artifact_dir, &stem, None, &bytes)?);
    }

    if !job.elements.is_empty() {
        let requests: Vec<CaptureRequest> = job
            .elements
            .iter()
            .map(|selector| CaptureRequest {
                name: job.page.clone(),
                theme: job.theme.clone(),
                selector: Some(selector.clone()),
            })
            .collect();
        let items = handler.capture_batch(&page, &requests).await;
        for (selector, item) in job.elements.iter().zip(items) {
            let name = format!("{}-{}", stem, slug(selector));
            if let Some(e) = &item.error {
                warn!("Element '{}' on '{}' degraded to placeholder: {}", selector, job.page, e);
            }
            artifacts.push(write_artifact(
                &ctx.artifact_dir,
                &name,
                Some(selector),
                &item.bytes,
            )?);
        }
    }

    let audit = match job.audit {
        Some(level) => Some(
            handler
                .run_audit_with_fallbacks(&page, &ctx.engine, &job.page, &job.theme, Some(level))
                .await,
        ),
        None => None,
    };

    Ok((artifacts, audit))
}

async fn run_worker(worker: usize, jobs: Vec<Job>, ctx: Arc<WorkerContext>) -> (Vec<JobResult>, ErrorLog) {
    let mut handler = ResilienceHandler::with_config(ctx.resilience.clone());
    let mut results = Vec::with_capacity(jobs.len());
    info!("Worker {} starting with {} job(s)", worker, jobs.len());

    for job in &jobs {
        let start = Instant::now();
        let outcome = run_job(&mut handler, &ctx, job).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok((artifacts, audit)) => {
                info!(
                    "✓ {} [{} {}] ({} ms)",
                    job.page, job.theme, job.viewport, duration_ms
                );
                JobResult {
                    page: job.page.clone(),
                    theme: job.theme.clone(),
                    viewport: job.viewport,
                    worker,
                    duration_ms,
                    artifacts,
                    audit,
                    error: None,
                }
            }
            Err(e) => {
                error!("✗ {} [{} {}] - {}", job.page, job.theme, job.viewport, e);
                JobResult {
                    page: job.page.clone(),
                    theme: job.theme.clone(),
                    viewport: job.viewport,
                    worker,
                    duration_ms,
                    artifacts: Vec::new(),
                    audit: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    (results, handler.into_log())
}

/// Runs suites with one resilience handler per worker
pub struct SuiteRunner {
    config: RunnerConfig,
}

impl SuiteRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Wait for the application under test to respond
    pub async fn wait_for_app(&self, url: &str) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < self.config.health_timeout {
            attempts += 1;

            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {} ...", url);
                    }
                    // Connection refused is expected while the app is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::AppUnreachable {
            url: url.to_string(),
            attempts,
        })
    }

    pub async fn run(&self, suite: &SuiteSpec) -> E2eResult<SuiteReport> {
        suite.validate()?;
        let started_at = Utc::now();
        let start = Instant::now();

        if self.config.health_check {
            self.wait_for_app(&suite.base_url).await?;
        }

        let engine = match &self.config.axe_source {
            Some(path) => AxeEngine::from_file(path)?,
            None => AxeEngine::bundled(),
        };
        let artifact_dir = self.config.output_dir.join("screenshots").join(&suite.name);
        std::fs::create_dir_all(&artifact_dir)?;

        let ctx = Arc::new(WorkerContext {
            resilience: self.config.resilience.clone(),
            playwright: self.config.playwright.clone(),
            engine,
            artifact_dir,
        });

        let lanes = partition(suite.jobs(), self.config.workers.unwrap_or(suite.workers));
        let workers = lanes.len();
        info!(
            "Running suite '{}': {} job(s) on {} worker(s)",
            suite.name,
            lanes.iter().map(Vec::len).sum::<usize>(),
            workers
        );

        let handles: Vec<_> = lanes
            .into_iter()
            .enumerate()
            .map(|(worker, jobs)| tokio::spawn(run_worker(worker, jobs, Arc::clone(&ctx))))
            .collect();

        let mut jobs = Vec::new();
        let mut logs = Vec::with_capacity(workers);
        for (worker, handle) in handles.into_iter().enumerate() {
            let (results, log) = handle.await.map_err(|e| E2eError::Worker {
                worker,
                reason: e.to_string(),
            })?;
            jobs.extend(results);
            logs.push(log);
        }

        let merged = ErrorLog::merge(logs);
        let analysis = report::analyze(&merged, &self.config.resilience.reporting);
        let statistics = report::statistics(&merged);

        let suite_report = SuiteReport {
            suite: suite.name.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            workers,
            jobs,
            analysis,
            statistics,
        };

        info!(
            "Suite '{}': {} job(s), {} failed, {} degraded, {} error report(s), recovery rate {:.1}% ({} ms)",
            suite_report.suite,
            suite_report.jobs.len(),
            suite_report.failed_jobs(),
            suite_report.degraded_jobs(),
            suite_report.analysis.summary.total_errors,
            suite_report.analysis.summary.recovery_rate,
            suite_report.duration_ms
        );
        for recommendation in &suite_report.analysis.recommendations {
            warn!("Recommendation: {}", recommendation);
        }

        Ok(suite_report)
    }

    /// Write suite reports to JSON file
    pub fn write_results(&self, reports: &[SuiteReport]) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(reports)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for SuiteRunner {
    fn default() -> Self {
        Self::new()
    }
}
