//! Error types for the test runner

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("DOM error: {0}")]
    Dom(#[from] pagecheck_common::Error),

    #[error("Plugin already installed: {0}")]
    PluginAlreadyInstalled(String),

    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("Suite spec parse error: {0}")]
    SpecParse(String),

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Screenshot mismatch: {name} differs by {diff_percent:.2}% (threshold: {threshold:.2}%)")]
    ScreenshotMismatch {
        name: String,
        diff_percent: f64,
        threshold: f64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Error returned by a test function or lifecycle hook.
///
/// `Skipped` and `Todo` are control signals produced by
/// [`TestContext::skip`](crate::TestContext::skip) and
/// [`TestContext::todo`](crate::TestContext::todo); they end the execution
/// with that outcome instead of failing it.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TestError {
    #[error("{0}")]
    Assertion(String),

    #[error("Test timed out after {0} ms")]
    Timeout(u64),

    #[error("Test panicked: {0}")]
    Panic(String),

    #[error("{hook} hook failed: {message}")]
    Hook { hook: String, message: String },

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("DOM error: {0}")]
    Dom(String),

    #[error("Skipped: {}", .0.as_deref().unwrap_or("no reason given"))]
    Skipped(Option<String>),

    #[error("Todo: {0}")]
    Todo(String),
}

impl TestError {
    pub fn assertion(message: impl Into<String>) -> Self {
        TestError::Assertion(message.into())
    }

    /// Short machine-readable kind, used in results
    pub fn kind(&self) -> &'static str {
        match self {
            TestError::Assertion(_) => "assertion",
            TestError::Timeout(_) => "timeout",
            TestError::Panic(_) => "panic",
            TestError::Hook { .. } => "hook",
            TestError::Selector(_) => "selector",
            TestError::Dom(_) => "dom",
            TestError::Skipped(_) => "skipped",
            TestError::Todo(_) => "todo",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, TestError::Skipped(_) | TestError::Todo(_))
    }

    pub(crate) fn from_hook(hook: &str, error: TestError) -> Self {
        if error.is_control() {
            return error;
        }
        TestError::Hook {
            hook: hook.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<pagecheck_common::Error> for TestError {
    fn from(error: pagecheck_common::Error) -> Self {
        match error {
            pagecheck_common::Error::UnsupportedSelector(selector) => TestError::Selector(selector),
            other => TestError::Dom(other.to_string()),
        }
    }
}

/// Fail with an assertion error unless `condition` holds
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), TestError> {
    if condition {
        Ok(())
    } else {
        Err(TestError::Assertion(message.into()))
    }
}

/// Fail unless `actual == expected`, describing `what` was compared
pub fn ensure_eq<T>(actual: T, expected: T, what: &str) -> Result<(), TestError>
where
    T: PartialEq + std::fmt::Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(TestError::Assertion(format!(
            "{}: expected {:?}, got {:?}",
            what, expected, actual
        )))
    }
}
