//! Flakeguard E2E Runner
//!
//! Drives real browsers through the resilience core:
//! - Implements the core `Page` seam on top of Playwright's Node API
//! - Implements the core `AccessibilityEngine` seam with axe-core
//! - Parses declarative YAML suite specs
//! - Runs page/theme/viewport jobs on parallel workers and merges their error logs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Flakeguard Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteRunner                                                │
//! │    ├── wait_for_app(base_url)                               │
//! │    ├── partition(jobs, workers)                             │
//! │    ├── worker: ResilienceHandler                            │
//! │    │     ├── capture_with_fallbacks(page)                   │
//! │    │     ├── capture_batch(elements)                        │
//! │    │     └── run_audit_with_fallbacks(page, axe)            │
//! │    └── ErrorLog::merge -> analyze + statistics              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteSpec (YAML)                                           │
//! │    ├── name, base_url, workers                              │
//! │    ├── themes, viewports, conformance_level                 │
//! │    └── pages: [{ name, path, elements, capture, audit }]    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod axe;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod spec;

pub use axe::AxeEngine;
pub use error::{E2eError, E2eResult};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightPage};
pub use runner::{RunnerConfig, SuiteReport, SuiteRunner};
pub use spec::{Job, PageSpec, SuiteSpec};
