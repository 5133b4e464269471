//! Execution timing: totals, averages, slowest executions and slow-test
//! warnings

use std::sync::Arc;

use pagecheck_common::{Document, NodeId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PerformanceConfig;
use crate::events::{Outcome, SuiteResult, TestResult};
use crate::plugins::Plugin;
use crate::runner::{Execution, RunHook, Runner};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTiming {
    pub suite: String,
    pub test: String,
    pub element: NodeId,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub executions: usize,
    pub total_ms: f64,
    pub average_ms: f64,
    /// Slowest executions, slowest first
    pub slowest: Vec<ExecutionTiming>,
    /// Executions over the slow threshold, in run order
    pub slow: Vec<ExecutionTiming>,
    /// Wall time of the last complete run
    pub last_run_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct State {
    timings: Vec<ExecutionTiming>,
    slow: Vec<ExecutionTiming>,
    last_run_ms: Option<f64>,
}

pub struct PerformancePlugin {
    config: PerformanceConfig,
}

impl PerformancePlugin {
    pub fn new(config: PerformanceConfig) -> Self {
        Self { config }
    }
}

impl Default for PerformancePlugin {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}

struct PerformanceHook {
    config: PerformanceConfig,
    state: Arc<Mutex<State>>,
}

impl RunHook for PerformanceHook {
    fn name(&self) -> &str {
        "performance"
    }

    fn on_run_start(&self, _doc: &mut Document) {
        let mut state = self.state.lock();
        state.timings.clear();
        state.slow.clear();
    }

    fn after_execution(&self, _doc: &mut Document, execution: &Execution, result: &TestResult) {
        let timing = ExecutionTiming {
            suite: execution.suite.clone(),
            test: execution.test.clone(),
            element: execution.element,
            duration_ms: result.duration_ms,
        };
        let mut state = self.state.lock();
        if result.outcome != Outcome::Skip && result.duration_ms > self.config.slow_threshold_ms {
            warn!(
                "Slow test: {} > {} took {:.1} ms (threshold {:.1} ms)",
                timing.suite, timing.test, timing.duration_ms, self.config.slow_threshold_ms
            );
            state.slow.push(timing.clone());
        }
        state.timings.push(timing);
    }

    fn on_run_complete(&self, _doc: &mut Document, results: &[SuiteResult]) {
        self.state.lock().last_run_ms = Some(results.iter().map(|s| s.duration_ms).sum());
    }
}

/// Read access to the collected timings
#[derive(Clone)]
pub struct PerformanceHandle {
    slowest: usize,
    state: Arc<Mutex<State>>,
}

impl PerformanceHandle {
    pub fn metrics(&self) -> PerformanceMetrics {
        let state = self.state.lock();
        let total_ms: f64 = state.timings.iter().map(|t| t.duration_ms).sum();
        let executions = state.timings.len();

        let mut slowest = state.timings.clone();
        slowest.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slowest.truncate(self.slowest);

        PerformanceMetrics {
            executions,
            total_ms,
            average_ms: if executions == 0 { 0.0 } else { total_ms / executions as f64 },
            slowest,
            slow: state.slow.clone(),
            last_run_ms: state.last_run_ms,
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = State::default();
    }
}

impl Plugin for PerformancePlugin {
    type Handle = PerformanceHandle;

    fn name(&self) -> &'static str {
        "performance"
    }

    fn install(self, runner: &Runner) -> PerformanceHandle {
        let state = Arc::new(Mutex::new(State::default()));
        let slowest = self.config.slowest;
        runner.add_hook(Arc::new(PerformanceHook {
            config: self.config,
            state: state.clone(),
        }));
        PerformanceHandle { slowest, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(test: &str, duration_ms: f64) -> TestResult {
        TestResult {
            suite: "S".to_string(),
            name: test.to_string(),
            outcome: Outcome::Pass,
            duration_ms,
            error: None,
            message: None,
            element: None,
        }
    }

    #[test]
    fn aggregates_and_ranks() {
        let state = Arc::new(Mutex::new(State::default()));
        let hook = PerformanceHook {
            config: PerformanceConfig {
                enabled: true,
                slow_threshold_ms: 50.0,
                slowest: 2,
            },
            state: state.clone(),
        };
        let handle = PerformanceHandle { slowest: 2, state };
        let mut doc = Document::new();

        for (name, ms) in [("a", 10.0), ("b", 70.0), ("c", 30.0)] {
            let execution = Execution {
                suite: "S".to_string(),
                test: name.to_string(),
                element: doc.root(),
            };
            hook.after_execution(&mut doc, &execution, &timing(name, ms));
        }

        let metrics = handle.metrics();
        assert_eq!(metrics.executions, 3);
        assert_eq!(metrics.total_ms, 110.0);
        assert!((metrics.average_ms - 36.666).abs() < 0.01);
        let slowest: Vec<_> = metrics.slowest.iter().map(|t| t.test.as_str()).collect();
        assert_eq!(slowest, vec!["b", "c"]);
        assert_eq!(metrics.slow.len(), 1);

        handle.reset();
        assert_eq!(handle.metrics().executions, 0);
    }
}
