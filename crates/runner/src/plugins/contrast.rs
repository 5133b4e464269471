//! Text contrast analysis of every executed element

use std::sync::Arc;

use pagecheck_common::{analyze_contrast, ContrastResult, Document, ElementQuery, NodeId, WcagLevel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ContrastConfig;
use crate::context::element_selector;
use crate::events::TestResult;
use crate::plugins::Plugin;
use crate::runner::{Execution, RunHook, Runner};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastRecord {
    pub suite: String,
    pub test: String,
    pub element: NodeId,
    pub selector: String,
    pub result: ContrastResult,
    pub passes: bool,
}

pub struct ContrastPlugin {
    level: WcagLevel,
}

impl ContrastPlugin {
    pub fn new(level: WcagLevel) -> Self {
        Self { level }
    }

    pub fn from_config(config: &ContrastConfig) -> Self {
        Self::new(config.level)
    }
}

impl Default for ContrastPlugin {
    fn default() -> Self {
        Self::new(WcagLevel::AA)
    }
}

fn has_own_text(doc: &Document, node: NodeId) -> bool {
    doc.children(node)
        .iter()
        .any(|child| doc.text(*child).is_some_and(|text| !text.trim().is_empty()))
}

struct ContrastHook {
    level: WcagLevel,
    records: Arc<Mutex<Vec<ContrastRecord>>>,
}

impl RunHook for ContrastHook {
    fn name(&self) -> &str {
        "contrast"
    }

    fn on_run_start(&self, _doc: &mut Document) {
        self.records.lock().clear();
    }

    fn after_execution(&self, doc: &mut Document, execution: &Execution, _result: &TestResult) {
        let node = execution.element;
        if !doc.is_element(node) || !has_own_text(doc, node) {
            return;
        }
        let result = analyze_contrast(&*doc, node);
        let passes = result.passes(self.level);
        let selector = element_selector(doc, node);
        debug!("Contrast {:.2}:1 for {} ({})", result.ratio, selector, if passes { "ok" } else { "low" });

        let mut records = self.records.lock();
        // An element hit by several tests is analysed once
        if records.iter().any(|r| r.element == node) {
            return;
        }
        records.push(ContrastRecord {
            suite: execution.suite.clone(),
            test: execution.test.clone(),
            element: node,
            selector,
            result,
            passes,
        });
    }
}

#[derive(Clone)]
pub struct ContrastHandle {
    level: WcagLevel,
    records: Arc<Mutex<Vec<ContrastRecord>>>,
}

impl ContrastHandle {
    pub fn level(&self) -> WcagLevel {
        self.level
    }

    pub fn results(&self) -> Vec<ContrastRecord> {
        self.records.lock().clone()
    }

    pub fn failures(&self) -> Vec<ContrastRecord> {
        self.records.lock().iter().filter(|r| !r.passes).cloned().collect()
    }

    /// Lowest ratio seen, if any element was analysed
    pub fn worst(&self) -> Option<ContrastRecord> {
        self.records
            .lock()
            .iter()
            .min_by(|a, b| a.result.ratio.total_cmp(&b.result.ratio))
            .cloned()
    }
}

impl Plugin for ContrastPlugin {
    type Handle = ContrastHandle;

    fn name(&self) -> &'static str {
        "contrast"
    }

    fn install(self, runner: &Runner) -> ContrastHandle {
        let records = Arc::new(Mutex::new(Vec::new()));
        runner.add_hook(Arc::new(ContrastHook {
            level: self.level,
            records: records.clone(),
        }));
        ContrastHandle {
            level: self.level,
            records,
        }
    }
}
