//! Flakeguard CLI - Main Entry Point
//!
//! Runs YAML suites of screenshot captures and accessibility audits
//! against a live application through Playwright.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use flakeguard_core::{validate_accessibility_tools, FlakeguardConfig};
use flakeguard_e2e::{
    AxeEngine, Browser, PlaywrightConfig, PlaywrightPage, RunnerConfig, SuiteRunner, SuiteSpec,
};

/// Flakeguard - resilient screenshots and accessibility audits
#[derive(Parser)]
#[command(name = "flakeguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Resilience configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one suite file or every suite in a directory
    Run {
        /// Suite YAML file or directory
        suites: PathBuf,

        /// Override the suite worker count
        #[arg(short, long)]
        workers: Option<usize>,

        /// chromium, firefox or webkit
        #[arg(long, default_value = "chromium")]
        browser: Browser,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// axe.min.js to inject into pages that do not bundle it
        #[arg(long)]
        axe_script: Option<PathBuf>,

        /// node_modules directory containing playwright
        #[arg(long)]
        node_modules: Option<PathBuf>,

        /// Directory for screenshots and the JSON report
        #[arg(short, long, default_value = "test-results")]
        output: PathBuf,

        /// Do not wait for the base URL before starting
        #[arg(long)]
        skip_health_check: bool,

        /// Exit non-zero when any artifact or audit is a placeholder
        #[arg(long)]
        fail_on_degraded: bool,
    },

    /// Parse suites and list the jobs they expand to
    Check {
        /// Suite YAML file or directory
        suites: PathBuf,
    },

    /// Report whether the accessibility tooling works on a page
    Probe {
        url: String,

        /// axe.min.js to inject when the page does not bundle it
        #[arg(long)]
        axe_script: Option<PathBuf>,

        /// node_modules directory containing playwright
        #[arg(long)]
        node_modules: Option<PathBuf>,
    },

    /// Write the default resilience configuration
    InitConfig {
        #[arg(default_value = "flakeguard.toml")]
        path: PathBuf,
    },

    /// Show version information
    Version,
}

fn axe_engine(script: Option<&PathBuf>) -> anyhow::Result<AxeEngine> {
    Ok(match script {
        Some(path) => AxeEngine::from_file(path)?,
        None => AxeEngine::bundled(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let resilience = match &cli.config {
        Some(path) => FlakeguardConfig::load(path)?,
        None => FlakeguardConfig::default(),
    };

    match cli.command {
        Commands::Run {
            suites,
            workers,
            browser,
            headed,
            axe_script,
            node_modules,
            output,
            skip_health_check,
            fail_on_degraded,
        } => {
            PlaywrightPage::check_installed()?;
            let specs = SuiteSpec::load_all(&suites)?;
            if specs.is_empty() {
                anyhow::bail!("no suites found under {}", suites.display());
            }

            let runner = SuiteRunner::with_config(RunnerConfig {
                resilience,
                playwright: PlaywrightConfig {
                    browser,
                    headless: !headed,
                    node_path: node_modules,
                    ..PlaywrightConfig::default()
                },
                workers,
                output_dir: output,
                axe_source: axe_script,
                health_check: !skip_health_check,
                health_timeout: Duration::from_secs(30),
            });

            let mut reports = Vec::with_capacity(specs.len());
            for spec in &specs {
                reports.push(runner.run(spec).await?);
            }
            let path = runner.write_results(&reports)?;

            let failed: usize = reports.iter().map(|r| r.failed_jobs()).sum();
            let degraded: usize = reports.iter().map(|r| r.degraded_jobs()).sum();
            println!();
            for report in &reports {
                let summary = &report.analysis.summary;
                println!(
                    "{} {}: {} job(s), {} failed, {} degraded, recovery {:.1}%",
                    if report.failed_jobs() == 0 { "✅" } else { "❌" },
                    report.suite,
                    report.jobs.len(),
                    report.failed_jobs(),
                    report.degraded_jobs(),
                    summary.recovery_rate
                );
            }
            println!("Report: {}", path.display());

            if failed > 0 || (fail_on_degraded && degraded > 0) {
                std::process::exit(1);
            }
        }
        Commands::Check { suites } => {
            let specs = SuiteSpec::load_all(&suites)?;
            for spec in &specs {
                let jobs = spec.jobs();
                println!("{} ({} job(s), {} worker(s))", spec.name, jobs.len(), spec.workers);
                for job in jobs {
                    let audit = job
                        .audit
                        .map(|level| format!("audit {:?}", level))
                        .unwrap_or_else(|| "no audit".to_string());
                    println!("  {}  {}  {}", job.artifact_stem(), job.url, audit);
                }
            }
        }
        Commands::Probe {
            url,
            axe_script,
            node_modules,
        } => {
            PlaywrightPage::check_installed()?;
            let engine = axe_engine(axe_script.as_ref())?;
            let page = PlaywrightPage::open(
                PlaywrightConfig {
                    node_path: node_modules,
                    ..PlaywrightConfig::default()
                },
                url.as_str(),
            )?;

            let tools = validate_accessibility_tools(&page, &engine).await;
            println!("Engine loaded:  {}", if tools.engine_loaded { "yes" } else { "no" });
            println!("DOM queries:    {}", if tools.dom_query_works { "yes" } else { "no" });
            if let Some(error) = &tools.error {
                println!("Errors:         {}", error);
            }
            if !tools.engine_usable() {
                std::process::exit(1);
            }
        }
        Commands::InitConfig { path } => {
            resilience.save(&path)?;
            println!("Wrote {}", path.display());
        }
        Commands::Version => {
            println!("Flakeguard v{}", env!("CARGO_PKG_VERSION"));
            println!("Resilient screenshot capture and accessibility audits for E2E suites");
            println!();
            println!("Build info:");
            println!("  Core: v{}", flakeguard_core::VERSION);
        }
    }

    Ok(())
}
