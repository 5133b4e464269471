//! Runner and file configuration
//!
//! `pagecheck.toml` layout:
//!
//! ```toml
//! [runner]
//! test_timeout_ms = 5000
//! bail = false
//! highlight_failures = true
//!
//! [url]
//! remove_www = true
//! keep_query_params = false
//!
//! [report]
//! reporter = "console"
//! output_dir = "test-results"
//!
//! [plugins.performance]
//! enabled = true
//! slow_threshold_ms = 100.0
//!
//! [plugins.watch]
//! ignore_selectors = ["#clock"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use pagecheck_common::{NormalizeOptions, WcagLevel};
use serde::{Deserialize, Serialize};

use crate::error::RunnerResult;

/// Core execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Per-execution timeout, 0 disables it
    pub test_timeout_ms: u64,
    /// Stop executing after the first failure
    pub bail: bool,
    /// Draw an overlay on elements whose execution failed
    pub highlight_failures: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            test_timeout_ms: 5000,
            bail: false,
            highlight_failures: false,
        }
    }
}

impl RunnerConfig {
    pub fn test_timeout(&self) -> Option<Duration> {
        (self.test_timeout_ms > 0).then(|| Duration::from_millis(self.test_timeout_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    #[default]
    Console,
    Json,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub reporter: ReporterKind,
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            reporter: ReporterKind::Console,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enabled: bool,
    pub slow_threshold_ms: f64,
    /// How many of the slowest executions to keep
    pub slowest: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            slow_threshold_ms: 100.0,
            slowest: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastConfig {
    pub enabled: bool,
    pub level: WcagLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    pub baseline_dir: PathBuf,
    pub diff_dir: PathBuf,
    /// Allowed differing pixels (0.0 - 100.0 percent)
    pub threshold: f64,
    /// Copy captures over baselines instead of comparing
    pub update_baselines: bool,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("test-results/screenshots"),
            baseline_dir: PathBuf::from("test-results/baselines"),
            diff_dir: PathBuf::from("test-results/diffs"),
            threshold: 0.5,
            update_baselines: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Changes inside elements matching these selectors never trigger a re-run
    pub ignore_selectors: Vec<String>,
    /// Attribute changes with these names never trigger a re-run
    pub ignore_attributes: Vec<String>,
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ignore_selectors: Vec::new(),
            ignore_attributes: vec!["style".to_string()],
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub performance: PerformanceConfig,
    pub contrast: ContrastConfig,
    pub screenshot: ScreenshotConfig,
    pub isolation: IsolationConfig,
    pub watch: WatchConfig,
}

/// Contents of `pagecheck.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagecheckConfig {
    pub runner: RunnerConfig,
    pub url: NormalizeOptions,
    pub report: ReportConfig,
    pub plugins: PluginsConfig,
}

impl PagecheckConfig {
    pub const FILE_NAME: &'static str = "pagecheck.toml";

    /// Load configuration from file, falling back to defaults when it does
    /// not exist
    pub fn load(path: &Path) -> RunnerResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> RunnerResult<Self> {
        Ok(toml::from_str(content)?)
    }
}
