//! CLI Commands

pub mod audit;
pub mod headings;
pub mod inspect;
pub mod normalize;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use pagecheck_common::{Document, WcagLevel};
use pagecheck_runner::config::ReporterKind;
use pagecheck_runner::plugins::{
    ContrastHandle, ContrastPlugin, IsolationPlugin, PerformanceHandle, PerformancePlugin, ScreenshotHandle,
    ScreenshotPlugin,
};
use pagecheck_runner::{reporter, PagecheckConfig, RunSummary, Runner, SuiteResult};
use serde::Serialize;
use tracing::debug;

use crate::output::{flag, print_list, print_title, OutputFormat, TableDisplay};

pub fn load_document(path: &Path) -> Result<Document> {
    Document::from_file(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReporterArg {
    Console,
    Json,
    Minimal,
}

impl From<ReporterArg> for ReporterKind {
    fn from(arg: ReporterArg) -> Self {
        match arg {
            ReporterArg::Console => ReporterKind::Console,
            ReporterArg::Json => ReporterKind::Json,
            ReporterArg::Minimal => ReporterKind::Minimal,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LevelArg {
    Aa,
    Aaa,
}

impl From<LevelArg> for WcagLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Aa => WcagLevel::AA,
            LevelArg::Aaa => WcagLevel::AAA,
        }
    }
}

/// Flags shared by the commands that execute suites; each overrides the
/// matching configuration value
#[derive(Debug, Args)]
pub struct RunOptions {
    /// Stop after the first failure
    #[arg(long)]
    pub bail: bool,

    /// Per-execution timeout in milliseconds (0 disables)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Reporter for progress and results
    #[arg(long, value_enum)]
    pub reporter: Option<ReporterArg>,

    /// Directory for result files
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Record execution timings
    #[arg(long)]
    pub perf: bool,

    /// Snapshot failed elements and compare them against baselines
    #[arg(long)]
    pub screenshots: bool,

    /// Overwrite screenshot baselines instead of comparing
    #[arg(long)]
    pub update_baselines: bool,

    /// Restore the document after every execution
    #[arg(long)]
    pub isolate: bool,
}

impl RunOptions {
    pub fn apply(&self, config: &mut PagecheckConfig) {
        config.runner.bail |= self.bail;
        if let Some(timeout_ms) = self.timeout_ms {
            config.runner.test_timeout_ms = timeout_ms;
        }
        if let Some(reporter) = self.reporter {
            config.report.reporter = reporter.into();
        }
        if let Some(dir) = &self.output_dir {
            config.report.output_dir = dir.clone();
        }
        config.plugins.performance.enabled |= self.perf;
        config.plugins.screenshot.enabled |= self.screenshots || self.update_baselines;
        config.plugins.screenshot.update_baselines |= self.update_baselines;
        config.plugins.isolation.enabled |= self.isolate;
    }
}

/// A runner plus the handles of the plugins enabled in the config
pub struct Session {
    pub runner: Runner,
    performance: Option<PerformanceHandle>,
    contrast: Option<ContrastHandle>,
    screenshots: Option<ScreenshotHandle>,
}

impl Session {
    pub fn new(document: Document, config: &PagecheckConfig) -> Result<Self> {
        let runner = Runner::with_config(document, config.runner.clone());
        runner.attach_reporter(reporter::from_config(&config.report));

        let plugins = &config.plugins;
        let performance = if plugins.performance.enabled {
            Some(runner.install(PerformancePlugin::new(plugins.performance.clone()))?)
        } else {
            None
        };
        let contrast = if plugins.contrast.enabled {
            Some(runner.install(ContrastPlugin::from_config(&plugins.contrast))?)
        } else {
            None
        };
        let screenshots = if plugins.screenshot.enabled {
            Some(runner.install(ScreenshotPlugin::new(plugins.screenshot.clone()))?)
        } else {
            None
        };
        if plugins.isolation.enabled {
            runner.install(IsolationPlugin::new())?;
        }
        debug!("Session ready with {} plugin(s)", runner.memory_usage().plugins);

        Ok(Self {
            runner,
            performance,
            contrast,
            screenshots,
        })
    }

    /// Run everything registered, print plugin summaries and report whether
    /// the run passed
    pub async fn run(&self, format: OutputFormat) -> Result<bool> {
        let results = self.runner.run().await?;
        self.print_summaries(format);
        Ok(self.passed(&results))
    }

    fn passed(&self, results: &[SuiteResult]) -> bool {
        let regressions = self
            .screenshots
            .as_ref()
            .map(|handle| handle.regressions().len())
            .unwrap_or(0);
        RunSummary::from_suites(results).success() && regressions == 0
    }

    fn print_summaries(&self, format: OutputFormat) {
        if let Some(handle) = &self.performance {
            let metrics = handle.metrics();
            print_title(
                &format!(
                    "Performance: {} executions, {:.1} ms total, {:.2} ms average",
                    metrics.executions, metrics.total_ms, metrics.average_ms
                ),
                format,
            );
            let rows: Vec<TimingRow> = metrics.slowest.iter().map(TimingRow::from).collect();
            print_list(&rows, format);
        }
        if let Some(handle) = &self.contrast {
            let failures = handle.failures();
            print_title(&format!("Contrast ({:?}): {} failure(s)", handle.level(), failures.len()), format);
            if !failures.is_empty() {
                let rows: Vec<ContrastRow> = failures
                    .iter()
                    .map(|record| ContrastRow {
                        selector: record.selector.clone(),
                        ratio: record.result.ratio,
                        large_text: record.result.large_text,
                    })
                    .collect();
                print_list(&rows, format);
            }
        }
        if let Some(handle) = &self.screenshots {
            let captures = handle.captures();
            if !captures.is_empty() {
                print_title("Screenshots of failures", format);
                let rows: Vec<ScreenshotRow> = captures
                    .iter()
                    .map(|record| ScreenshotRow {
                        name: record.name.clone(),
                        path: record.path.display().to_string(),
                        diff_percent: record.diff.as_ref().map(|d| d.diff_percent),
                    })
                    .collect();
                print_list(&rows, format);
            }
        }
    }
}

#[derive(Serialize)]
struct TimingRow {
    suite: String,
    test: String,
    duration_ms: f64,
}

impl From<&pagecheck_runner::plugins::ExecutionTiming> for TimingRow {
    fn from(timing: &pagecheck_runner::plugins::ExecutionTiming) -> Self {
        Self {
            suite: timing.suite.clone(),
            test: timing.test.clone(),
            duration_ms: timing.duration_ms,
        }
    }
}

impl TableDisplay for TimingRow {
    fn headers() -> Vec<&'static str> {
        vec!["Suite", "Test", "Duration (ms)"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.suite.clone(), self.test.clone(), format!("{:.1}", self.duration_ms)]
    }
}

#[derive(Serialize)]
struct ContrastRow {
    selector: String,
    ratio: f64,
    large_text: bool,
}

impl TableDisplay for ContrastRow {
    fn headers() -> Vec<&'static str> {
        vec!["Element", "Ratio", "Large text"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.selector.clone(), format!("{:.2}:1", self.ratio), flag(self.large_text)]
    }
}

#[derive(Serialize)]
struct ScreenshotRow {
    name: String,
    path: String,
    diff_percent: Option<f64>,
}

impl TableDisplay for ScreenshotRow {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Path", "Diff"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.path.clone(),
            self.diff_percent
                .map(|d| format!("{:.2}%", d))
                .unwrap_or_else(|| "no baseline".to_string()),
        ]
    }
}
