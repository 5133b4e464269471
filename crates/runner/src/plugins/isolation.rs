//! Document isolation: each execution starts from the same document and
//! its changes are rolled back afterwards

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pagecheck_common::Document;
use parking_lot::Mutex;
use tracing::debug;

use crate::events::TestResult;
use crate::plugins::Plugin;
use crate::runner::{Execution, RunHook, Runner};

#[derive(Default)]
struct State {
    enabled: AtomicBool,
    restores: AtomicUsize,
    snapshot: Mutex<Option<Document>>,
}

struct IsolationHook {
    state: Arc<State>,
}

impl RunHook for IsolationHook {
    fn name(&self) -> &str {
        "isolation"
    }

    fn before_execution(&self, doc: &mut Document, _execution: &Execution) {
        if self.state.enabled.load(Ordering::SeqCst) {
            *self.state.snapshot.lock() = Some(doc.clone());
        }
    }

    fn after_execution(&self, doc: &mut Document, execution: &Execution, _result: &TestResult) {
        if let Some(snapshot) = self.state.snapshot.lock().take() {
            if doc.mutation_seq() != snapshot.mutation_seq() {
                debug!("Restoring document after {} > {}", execution.suite, execution.test);
                *doc = snapshot;
                self.state.restores.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[derive(Default)]
pub struct IsolationPlugin;

impl IsolationPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct IsolationHandle {
    state: Arc<State>,
}

impl IsolationHandle {
    /// How many executions changed the document and were rolled back
    pub fn restores(&self) -> usize {
        self.state.restores.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    /// Pause or resume isolation without uninstalling
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl Plugin for IsolationPlugin {
    type Handle = IsolationHandle;

    fn name(&self) -> &'static str {
        "isolation"
    }

    fn install(self, runner: &Runner) -> IsolationHandle {
        let state = Arc::new(State::default());
        state.enabled.store(true, Ordering::SeqCst);
        runner.add_hook(Arc::new(IsolationHook {
            state: state.clone(),
        }));
        IsolationHandle { state }
    }
}
