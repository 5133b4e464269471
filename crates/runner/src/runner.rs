//! Runner core: suite registry, selector matching, per-element execution,
//! lifecycle hooks and event emission

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::FutureExt;
use pagecheck_common::{
    is_highlight_node, Document, ElementQuery, HighlightOptions, Highlighter, NodeId,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::context::{element_selector, share, Control, SharedDocument, TestContext};
use crate::error::{RunnerError, RunnerResult, TestError};
use crate::events::{
    ElementRef, EventKind, Outcome, RunSummary, SuiteResult, TestEvent, TestFailure, TestResult,
};
use crate::plugins::Plugin;
use crate::reporter::Reporter;
use crate::suite::{Suite, Test, TestFn};

pub type Listener = Arc<dyn Fn(&TestEvent) + Send + Sync>;

/// Receives every event of the next run; ends after `test-complete`
pub type EventStream = UnboundedReceiver<TestEvent>;

pub const BAIL_MESSAGE: &str = "Skipped after earlier failure (bail)";

/// Unsubscribe token returned by [`Runner::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The execution a hook is being called around
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub suite: String,
    pub test: String,
    pub element: NodeId,
}

/// Lifecycle callbacks for plugins. Every call gets exclusive access to
/// the document; a panicking hook is logged and otherwise ignored.
pub trait RunHook: Send + Sync {
    fn name(&self) -> &str;

    fn on_run_start(&self, _doc: &mut Document) {}

    fn before_execution(&self, _doc: &mut Document, _execution: &Execution) {}

    fn after_execution(&self, _doc: &mut Document, _execution: &Execution, _result: &TestResult) {}

    fn on_run_complete(&self, _doc: &mut Document, _results: &[SuiteResult]) {}
}

/// Registry sizes, for diagnostics only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub suites: usize,
    pub tests: usize,
    pub suite_hooks: usize,
    pub listeners: usize,
    pub run_hooks: usize,
    pub plugins: usize,
    pub streams: usize,
}

struct RunnerInner {
    document: SharedDocument,
    config: RwLock<RunnerConfig>,
    suites: Mutex<Vec<Arc<Suite>>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    streams: Mutex<Vec<UnboundedSender<TestEvent>>>,
    hooks: Mutex<Vec<Arc<dyn RunHook>>>,
    plugins: Mutex<Vec<String>>,
    highlighter: Mutex<Highlighter>,
    running: AtomicBool,
}

/// Clears the running flag however `run` exits
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Test runner bound to one document. Cloning yields another handle to the
/// same runner.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<RunnerInner>,
}

impl Runner {
    pub fn new(document: Document) -> Self {
        Self::with_config(document, RunnerConfig::default())
    }

    pub fn with_config(document: Document, config: RunnerConfig) -> Self {
        Self::from_shared(share(document), config)
    }

    pub fn from_shared(document: SharedDocument, config: RunnerConfig) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                document,
                config: RwLock::new(config),
                suites: Mutex::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                streams: Mutex::new(Vec::new()),
                hooks: Mutex::new(Vec::new()),
                plugins: Mutex::new(Vec::new()),
                highlighter: Mutex::new(Highlighter::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.inner.document
    }

    pub fn config(&self) -> RunnerConfig {
        self.inner.config.read().clone()
    }

    pub fn set_config(&self, config: RunnerConfig) {
        *self.inner.config.write() = config;
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // ---- registration ----

    /// Register an unscoped suite: its tests run against the document node
    /// or the elements their own selectors match
    pub fn describe(&self, name: impl Into<String>, define: impl FnOnce(&mut Suite)) {
        self.register(Suite::new(&name.into(), None), define);
    }

    /// Register a suite whose tests run once per element matching `selector`
    pub fn describe_within(
        &self,
        name: impl Into<String>,
        selector: &str,
        define: impl FnOnce(&mut Suite),
    ) {
        self.register(Suite::new(&name.into(), Some(selector)), define);
    }

    /// Register a focused suite
    pub fn describe_only(&self, name: impl Into<String>, define: impl FnOnce(&mut Suite)) {
        let mut suite = Suite::new(&name.into(), None);
        suite.only();
        self.register(suite, define);
    }

    fn register(&self, mut suite: Suite, define: impl FnOnce(&mut Suite)) {
        define(&mut suite);
        debug!("Registered suite '{}' with {} test(s)", suite.name, suite.tests.len());
        self.inner.suites.lock().push(Arc::new(suite));
    }

    pub fn suite_names(&self) -> Vec<String> {
        self.inner.suites.lock().iter().map(|s| s.name.clone()).collect()
    }

    /// Remove every registered suite; listeners, hooks and plugins stay
    pub fn clear(&self) {
        self.inner.suites.lock().clear();
    }

    /// Remove suites, listeners, streams, hooks, installed plugins and any
    /// failure highlights
    pub fn reset(&self) {
        self.clear();
        self.inner.listeners.lock().clear();
        self.inner.streams.lock().clear();
        self.inner.hooks.lock().clear();
        self.inner.plugins.lock().clear();
        self.clear_highlights();
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let suites = self.inner.suites.lock();
        MemoryUsage {
            suites: suites.len(),
            tests: suites.iter().map(|s| s.tests.len()).sum(),
            suite_hooks: suites.iter().map(|s| s.hook_count()).sum(),
            listeners: self.inner.listeners.lock().len(),
            run_hooks: self.inner.hooks.lock().len(),
            plugins: self.inner.plugins.lock().len(),
            streams: self.inner.streams.lock().len(),
        }
    }

    // ---- observers ----

    /// Subscribe to every event. Listeners run synchronously in
    /// registration order.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TestEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribe. Returns whether the listener was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Forward events to a reporter
    pub fn attach_reporter<R: Reporter + ?Sized + 'static>(&self, reporter: Arc<R>) -> ListenerId {
        self.on(move |event| reporter.on_event(event))
    }

    /// Events of the next (or current) run as a stream
    pub fn stream(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded();
        self.inner.streams.lock().push(tx);
        rx
    }

    fn emit(&self, kind: EventKind) {
        let event = TestEvent::new(kind);
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!("Event listener panicked on {}", event.kind.name());
            }
        }

        let mut streams = self.inner.streams.lock();
        if event.is_complete() {
            for tx in streams.drain(..) {
                let _ = tx.unbounded_send(event.clone());
            }
        } else {
            streams.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
        }
    }

    // ---- plugins ----

    pub fn add_hook(&self, hook: Arc<dyn RunHook>) {
        self.inner.hooks.lock().push(hook);
    }

    /// Install a plugin once; a second plugin with the same name is refused
    pub fn install<P: Plugin>(&self, plugin: P) -> RunnerResult<P::Handle> {
        let name = plugin.name().to_string();
        {
            let mut plugins = self.inner.plugins.lock();
            if plugins.contains(&name) {
                return Err(RunnerError::PluginAlreadyInstalled(name));
            }
            plugins.push(name.clone());
        }
        info!("Installed plugin '{}'", name);
        Ok(plugin.install(self))
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.inner.plugins.lock().iter().any(|p| p == name)
    }

    fn call_hooks(
        &self,
        hooks: &[Arc<dyn RunHook>],
        stage: &str,
        mut call: impl FnMut(&dyn RunHook, &mut Document),
    ) {
        for hook in hooks {
            let mut doc = self.inner.document.write();
            if catch_unwind(AssertUnwindSafe(|| call(hook.as_ref(), &mut doc))).is_err() {
                warn!("Plugin '{}' failed during {}", hook.name(), stage);
            }
        }
    }

    // ---- highlighting ----

    pub fn highlighted_count(&self) -> usize {
        self.inner.highlighter.lock().highlighted_count()
    }

    pub fn clear_highlights(&self) {
        let mut doc = self.inner.document.write();
        if let Err(e) = self.inner.highlighter.lock().destroy(&mut doc) {
            warn!("Failed to remove highlights: {}", e);
        }
    }

    /// Overlay every failed execution once all suites have finished
    fn highlight_failures(&self, results: &[SuiteResult]) {
        let mut doc = self.inner.document.write();
        let mut highlighter = self.inner.highlighter.lock();
        let failed = results
            .iter()
            .flat_map(|suite| suite.results.iter())
            .filter(|result| result.outcome == Outcome::Fail);
        for result in failed {
            let Some(element) = &result.element else {
                continue;
            };
            let tooltip = match &result.error {
                Some(error) => format!("{}: {}", result.name, error.message),
                None => result.name.clone(),
            };
            let options = HighlightOptions::default().with_tooltip(tooltip);
            if let Err(e) = highlighter.highlight(&mut doc, element.node, options) {
                debug!("Not highlighting {}: {}", element.node, e);
            }
        }
    }

    // ---- execution ----

    /// Run every registered suite and return their results
    pub async fn run(&self) -> RunnerResult<Vec<SuiteResult>> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(RunnerError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.inner.running);

        let suites: Vec<Arc<Suite>> = self.inner.suites.lock().clone();
        let hooks: Vec<Arc<dyn RunHook>> = self.inner.hooks.lock().clone();
        let config = self.config();
        let focus = suites.iter().any(|s| s.is_focused());
        let test_count: usize = suites.iter().map(|s| s.tests.len()).sum();
        let start = Instant::now();

        info!("Running {} suite(s), {} test(s)...", suites.len(), test_count);
        self.emit(EventKind::RunStart {
            suites: suites.len(),
            tests: test_count,
        });
        // Overlays from an earlier run must not be matched by this one
        self.clear_highlights();
        self.call_hooks(&hooks, "run start", |hook, doc| hook.on_run_start(doc));

        let mut bailed = false;
        let mut results = Vec::with_capacity(suites.len());
        for suite in &suites {
            let result = self.run_suite(suite, focus, &config, &hooks, &mut bailed).await;
            self.emit(EventKind::SuiteComplete(result.clone()));
            results.push(result);
        }

        let summary = RunSummary::from_suites(&results);
        let duration_ms = elapsed_ms(start);
        info!(
            "Test Results: {} passed, {} failed, {} skipped, {} todo ({:.0} ms)",
            summary.passed, summary.failed, summary.skipped, summary.todo, duration_ms
        );

        if config.highlight_failures {
            self.highlight_failures(&results);
        }
        self.call_hooks(&hooks, "run complete", |hook, doc| {
            hook.on_run_complete(doc, &results)
        });
        self.emit(EventKind::TestComplete {
            results: results.clone(),
            summary,
            duration_ms,
        });
        Ok(results)
    }

    async fn run_suite(
        &self,
        suite: &Suite,
        focus: bool,
        config: &RunnerConfig,
        hooks: &[Arc<dyn RunHook>],
        bailed: &mut bool,
    ) -> SuiteResult {
        let start = Instant::now();
        let roots = self.resolve_roots(suite);
        self.emit(EventKind::SuiteStart {
            suite: suite.name.clone(),
            roots: roots.as_ref().map(Vec::len).unwrap_or(0),
        });
        debug!("Running suite: {}", suite.name);

        let mut results = Vec::new();
        for test in &suite.tests {
            if let Some(result) = short_circuit(suite, test, focus, *bailed) {
                self.record(&mut results, result);
                continue;
            }

            let roots = match &roots {
                Ok(roots) => roots,
                Err(error) => {
                    self.record(&mut results, failed_without_element(suite, test, error));
                    continue;
                }
            };
            if roots.is_empty() {
                let selector = suite.selector.as_deref().unwrap_or_default();
                self.record(&mut results, no_match(suite, test, selector));
                continue;
            }

            let targets = match self.resolve_targets(roots, test) {
                Ok(targets) => targets,
                Err(error) => {
                    self.record(&mut results, failed_without_element(suite, test, &error));
                    continue;
                }
            };
            if targets.is_empty() {
                let selector = test.selector.as_deref().unwrap_or_default();
                self.record(&mut results, no_match(suite, test, selector));
                continue;
            }

            for element in targets {
                if *bailed {
                    let mut result =
                        TestResult::not_run(&suite.name, &test.name, Outcome::Skip, BAIL_MESSAGE);
                    result.element = Some(self.element_ref(element));
                    self.record(&mut results, result);
                    continue;
                }
                let result = self.execute(suite, test, element, config, hooks).await;
                if result.is_failure() && config.bail {
                    warn!("Bailing out after failure in {} > {}", suite.name, test.name);
                    *bailed = true;
                }
                results.push(result);
            }
        }

        SuiteResult::new(&suite.name, results, elapsed_ms(start))
    }

    fn record(&self, results: &mut Vec<TestResult>, result: TestResult) {
        debug!("{} {} > {}", result.outcome.symbol(), result.suite, result.name);
        self.emit(EventKind::TestResult(result.clone()));
        results.push(result);
    }

    fn element_ref(&self, node: NodeId) -> ElementRef {
        ElementRef {
            node,
            selector: element_selector(&self.inner.document.read(), node),
        }
    }

    fn resolve_roots(&self, suite: &Suite) -> Result<Vec<NodeId>, TestError> {
        let doc = self.inner.document.read();
        match &suite.selector {
            Some(selector) => {
                let roots = doc.query_selector_all(doc.root(), selector)?;
                Ok(without_overlays(&doc, roots))
            }
            None => Ok(vec![doc.root()]),
        }
    }

    fn resolve_targets(&self, roots: &[NodeId], test: &Test) -> Result<Vec<NodeId>, TestError> {
        let Some(selector) = &test.selector else {
            return Ok(roots.to_vec());
        };
        let doc = self.inner.document.read();
        let mut found = Vec::new();
        for root in roots {
            found.extend(doc.query_selector_all(*root, selector)?);
        }
        let mut targets = without_overlays(&doc, found);
        if roots.len() > 1 {
            targets = document_order(&doc, targets);
        }
        Ok(targets)
    }

    async fn execute(
        &self,
        suite: &Suite,
        test: &Test,
        element: NodeId,
        config: &RunnerConfig,
        hooks: &[Arc<dyn RunHook>],
    ) -> TestResult {
        let element_ref = self.element_ref(element);
        self.emit(EventKind::TestStart {
            suite: suite.name.clone(),
            test: test.name.clone(),
            element: Some(element_ref.clone()),
        });

        let execution = Execution {
            suite: suite.name.clone(),
            test: test.name.clone(),
            element,
        };
        self.call_hooks(hooks, "before execution", |hook, doc| {
            hook.before_execution(doc, &execution)
        });

        let ctx = TestContext::new(self.inner.document.clone(), element, &suite.name, &test.name);
        let timeout = config.test_timeout();
        let start = Instant::now();

        let mut failure = None;
        for hook in &suite.before_each {
            if let Err(error) = invoke(hook, ctx.clone(), timeout).await {
                failure = Some(TestError::from_hook("before_each", error));
                break;
            }
        }
        if failure.is_none() {
            failure = invoke(&test.func, ctx.clone(), timeout).await.err();
        }
        for hook in &suite.after_each {
            if let Err(error) = invoke(hook, ctx.clone(), timeout).await {
                // A real hook failure outranks a skip or todo from the body
                if failure.as_ref().map_or(true, TestError::is_control) {
                    failure = Some(TestError::from_hook("after_each", error));
                }
            }
        }
        let duration_ms = elapsed_ms(start);

        let (outcome, error, message) = match failure {
            Some(TestError::Skipped(reason)) => (Outcome::Skip, None, reason),
            Some(TestError::Todo(reason)) => (Outcome::Todo, None, Some(reason)),
            Some(error) => (Outcome::Fail, Some(TestFailure::from(&error)), None),
            None => match ctx.control() {
                Some(Control::Skip(reason)) => (Outcome::Skip, None, reason),
                Some(Control::Todo(reason)) => (Outcome::Todo, None, Some(reason)),
                None => (Outcome::Pass, None, None),
            },
        };

        let result = TestResult {
            suite: suite.name.clone(),
            name: test.name.clone(),
            outcome,
            duration_ms,
            error,
            message,
            element: Some(element_ref),
        };

        match &result.error {
            Some(error) => warn!(
                "✗ {} > {} on {} - {}",
                suite.name, test.name, element, error.message
            ),
            None => debug!(
                "{} {} > {} ({:.1} ms)",
                outcome.symbol(),
                suite.name,
                test.name,
                duration_ms
            ),
        }

        self.call_hooks(hooks, "after execution", |hook, doc| {
            hook.after_execution(doc, &execution, &result)
        });
        self.emit(EventKind::TestResult(result.clone()));
        result
    }
}

/// Results for tests that never execute: bail, focus, skip and todo flags
fn short_circuit(suite: &Suite, test: &Test, focus: bool, bailed: bool) -> Option<TestResult> {
    let not_run = |outcome, message: &str| {
        Some(TestResult::not_run(&suite.name, &test.name, outcome, message))
    };

    if bailed {
        not_run(Outcome::Skip, BAIL_MESSAGE)
    } else if focus && !is_focused(suite, test) {
        not_run(Outcome::Skip, "Not focused: another suite or test is marked only")
    } else if suite.skip || test.skip {
        not_run(Outcome::Skip, "Skipped")
    } else if let Some(reason) = &test.todo {
        not_run(Outcome::Todo, reason)
    } else {
        None
    }
}

/// A `test.only` narrows its suite even when the suite is itself focused
fn is_focused(suite: &Suite, test: &Test) -> bool {
    if suite.tests.iter().any(|t| t.only) {
        test.only
    } else {
        suite.only
    }
}

fn without_overlays(doc: &Document, nodes: Vec<NodeId>) -> Vec<NodeId> {
    nodes.into_iter().filter(|node| !is_highlight_node(doc, *node)).collect()
}

fn no_match(suite: &Suite, test: &Test, selector: &str) -> TestResult {
    TestResult::not_run(
        &suite.name,
        &test.name,
        Outcome::Skip,
        format!("No elements found for selector \"{}\"", selector),
    )
}

fn failed_without_element(suite: &Suite, test: &Test, error: &TestError) -> TestResult {
    TestResult {
        suite: suite.name.clone(),
        name: test.name.clone(),
        outcome: Outcome::Fail,
        duration_ms: 0.0,
        error: Some(TestFailure::from(error)),
        message: None,
        element: None,
    }
}

/// Sort into document order and drop duplicates
fn document_order(doc: &Document, nodes: Vec<NodeId>) -> Vec<NodeId> {
    let position: HashMap<NodeId, usize> = std::iter::once(doc.root())
        .chain(doc.descendant_elements(doc.root()))
        .enumerate()
        .map(|(index, node)| (node, index))
        .collect();
    let mut ordered = nodes;
    ordered.sort_by_key(|node| position.get(node).copied().unwrap_or(usize::MAX));
    let mut seen = HashSet::new();
    ordered.retain(|node| seen.insert(*node));
    ordered
}

/// Call a test function or hook, turning panics and timeouts into errors
async fn invoke(f: &TestFn, ctx: TestContext, timeout: Option<Duration>) -> Result<(), TestError> {
    let future = match catch_unwind(AssertUnwindSafe(|| f(ctx))) {
        Ok(future) => future,
        Err(panic) => return Err(TestError::Panic(panic_message(panic.as_ref()))),
    };
    let guarded = AssertUnwindSafe(future).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(TestError::Timeout(limit.as_millis() as u64)),
        },
        None => guarded.await,
    };
    outcome.unwrap_or_else(|panic| Err(TestError::Panic(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
