//! Reporters turn the event stream into human or machine output

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colored::Colorize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{ReportConfig, ReporterKind};
use crate::error::RunnerResult;
use crate::events::{EventKind, Outcome, RunSummary, SuiteResult, TestEvent, TestResult};

/// Receives every event of a run, in order
pub trait Reporter: Send + Sync {
    fn on_event(&self, event: &TestEvent);
}

/// Build the reporter selected in the config
pub fn from_config(config: &ReportConfig) -> Arc<dyn Reporter> {
    match config.reporter {
        ReporterKind::Console => Arc::new(ConsoleReporter::new()),
        ReporterKind::Json => Arc::new(JsonReporter::new(&config.output_dir)),
        ReporterKind::Minimal => Arc::new(MinimalReporter::new()),
    }
}

type Sink = Mutex<Box<dyn Write + Send>>;

fn stdout_sink() -> Sink {
    Mutex::new(Box::new(std::io::stdout()))
}

fn summary_line(summary: &RunSummary, duration_ms: f64) -> String {
    let mut parts = vec![format!("{} passed", summary.passed).green().to_string()];
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed).red().to_string());
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped).yellow().to_string());
    }
    if summary.todo > 0 {
        parts.push(format!("{} todo", summary.todo).cyan().to_string());
    }
    format!(
        "{} ({} total, {:.0} ms)",
        parts.join(", "),
        summary.total,
        duration_ms
    )
}

/// Suite headers, one line per execution, failure details and a summary
pub struct ConsoleReporter {
    out: Sink,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self { out: stdout_sink() }
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    fn result_line(result: &TestResult) -> String {
        let symbol = match result.outcome {
            Outcome::Pass => result.outcome.symbol().green(),
            Outcome::Fail => result.outcome.symbol().red(),
            Outcome::Skip => result.outcome.symbol().yellow(),
            Outcome::Todo => result.outcome.symbol().cyan(),
        };
        let target = result
            .element
            .as_ref()
            .map(|element| format!(" {}", element.selector.dimmed()))
            .unwrap_or_default();
        let mut line = format!("  {} {}{} ({:.1} ms)", symbol, result.name, target, result.duration_ms);
        if let Some(message) = &result.message {
            line.push_str(&format!(" - {}", message));
        }
        line
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn on_event(&self, event: &TestEvent) {
        let mut out = self.out.lock();
        let written = match &event.kind {
            EventKind::SuiteStart { suite, .. } => writeln!(out, "{}", suite.bold()),
            EventKind::TestResult(result) => {
                let mut written = writeln!(out, "{}", Self::result_line(result));
                if let Some(failure) = &result.error {
                    written = written.and_then(|_| writeln!(out, "      {}", failure.message.red()));
                }
                written
            }
            EventKind::TestComplete { results, summary, duration_ms } => {
                let failures: Vec<&TestResult> = results
                    .iter()
                    .flat_map(|suite| suite.results.iter())
                    .filter(|result| result.is_failure())
                    .collect();
                let mut written = writeln!(out);
                if !failures.is_empty() {
                    written = written.and_then(|_| writeln!(out, "{}", "Failures:".red().bold()));
                    for result in failures {
                        let message = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or("");
                        written = written
                            .and_then(|_| writeln!(out, "  {} > {}: {}", result.suite, result.name, message));
                    }
                }
                written.and_then(|_| writeln!(out, "{}", summary_line(summary, *duration_ms)))
            }
            _ => Ok(()),
        };
        if let Err(e) = written.and_then(|_| out.flush()) {
            error!("Console reporter failed to write: {}", e);
        }
    }
}

/// One character per execution, then a summary line
pub struct MinimalReporter {
    out: Sink,
}

impl MinimalReporter {
    pub fn new() -> Self {
        Self { out: stdout_sink() }
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }
}

impl Default for MinimalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for MinimalReporter {
    fn on_event(&self, event: &TestEvent) {
        let mut out = self.out.lock();
        let written = match &event.kind {
            EventKind::TestResult(result) => {
                let mark = match result.outcome {
                    Outcome::Pass => ".".green(),
                    Outcome::Fail => "F".red(),
                    Outcome::Skip => "s".yellow(),
                    Outcome::Todo => "t".cyan(),
                };
                write!(out, "{}", mark)
            }
            EventKind::TestComplete { summary, duration_ms, .. } => {
                writeln!(out).and_then(|_| writeln!(out, "{}", summary_line(summary, *duration_ms)))
            }
            _ => Ok(()),
        };
        if let Err(e) = written.and_then(|_| out.flush()) {
            error!("Minimal reporter failed to write: {}", e);
        }
    }
}

/// Contents of `test-results.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub summary: RunSummary,
    pub suites: Vec<SuiteResult>,
}

/// Writes the complete results as JSON when the run finishes
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub const FILE_NAME: &'static str = "test-results.json";

    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join(Self::FILE_NAME)
    }

    /// Write results to the output directory
    pub fn write_results(&self, suites: &[SuiteResult], duration_ms: f64) -> RunnerResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let report = RunReport {
            generated_at: Utc::now(),
            duration_ms,
            summary: RunSummary::from_suites(suites),
            suites: suites.to_vec(),
        };
        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    pub fn read_results(path: &Path) -> RunnerResult<RunReport> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Reporter for JsonReporter {
    fn on_event(&self, event: &TestEvent) {
        if let EventKind::TestComplete { results, duration_ms, .. } = &event.kind {
            if let Err(e) = self.write_results(results, *duration_ms) {
                error!("Failed to write {}: {}", self.path().display(), e);
            }
        }
    }
}
