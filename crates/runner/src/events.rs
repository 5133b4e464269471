//! Results and the events emitted while a run progresses

use chrono::{DateTime, Utc};
use pagecheck_common::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::TestError;

/// Terminal state of one test × element execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
    Todo,
}

impl Outcome {
    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Pass => "✓",
            Outcome::Fail => "✗",
            Outcome::Skip => "-",
            Outcome::Todo => "…",
        }
    }
}

/// Element an execution ran against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub node: NodeId,
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub kind: String,
    pub message: String,
}

impl From<&TestError> for TestFailure {
    fn from(error: &TestError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of running a single test against a single element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub suite: String,
    pub name: String,
    pub outcome: Outcome,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementRef>,
}

impl TestResult {
    /// A result for a test that never executed
    pub(crate) fn not_run(suite: &str, name: &str, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            suite: suite.to_string(),
            name: name.to_string(),
            outcome,
            duration_ms: 0.0,
            error: None,
            message: Some(message.into()),
            element: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Fail
    }
}

/// Aggregated results of one suite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub name: String,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub todo: usize,
    pub duration_ms: f64,
    pub results: Vec<TestResult>,
}

impl SuiteResult {
    pub fn new(name: &str, results: Vec<TestResult>, duration_ms: f64) -> Self {
        let count = |outcome: Outcome| results.iter().filter(|r| r.outcome == outcome).count();
        Self {
            name: name.to_string(),
            passed: count(Outcome::Pass),
            failed: count(Outcome::Fail),
            skipped: count(Outcome::Skip),
            todo: count(Outcome::Todo),
            duration_ms,
            results,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Totals across a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub todo: usize,
}

impl RunSummary {
    pub fn from_suites(suites: &[SuiteResult]) -> Self {
        suites.iter().fold(Self::default(), |acc, suite| Self {
            total: acc.total + suite.total(),
            passed: acc.passed + suite.passed,
            failed: acc.failed + suite.failed,
            skipped: acc.skipped + suite.skipped,
            todo: acc.todo + suite.todo,
        })
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Event payloads, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum EventKind {
    RunStart {
        suites: usize,
        tests: usize,
    },
    SuiteStart {
        suite: String,
        roots: usize,
    },
    TestStart {
        suite: String,
        test: String,
        element: Option<ElementRef>,
    },
    TestResult(TestResult),
    SuiteComplete(SuiteResult),
    TestComplete {
        results: Vec<SuiteResult>,
        summary: RunSummary,
        duration_ms: f64,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RunStart { .. } => "run-start",
            EventKind::SuiteStart { .. } => "suite-start",
            EventKind::TestStart { .. } => "test-start",
            EventKind::TestResult(_) => "test-result",
            EventKind::SuiteComplete(_) => "suite-complete",
            EventKind::TestComplete { .. } => "test-complete",
        }
    }
}

/// Serialized as `{ "type": ..., "data": ..., "timestamp": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl TestEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.kind, EventKind::TestComplete { .. })
    }
}
