//! Watch mode: re-run when the document changes in a way tests care about
//!
//! Changes come from the document's mutation log. Overlay nodes drawn by
//! the highlighter, elements under configured selectors and configured
//! attribute names are filtered out, and so are changes made by the run
//! itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pagecheck_common::highlight::{CONTAINER_ID, OVERLAY_CLASS, TOOLTIP_CLASS};
use pagecheck_common::{Document, ElementQuery, MutationKind, MutationRecord, NodeId, SelectorList};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::events::SuiteResult;
use crate::plugins::Plugin;
use crate::runner::{RunHook, Runner};

/// Decides which mutations count as changes
struct ChangeFilter {
    ignore_selectors: Vec<SelectorList>,
    ignore_attributes: Vec<String>,
}

impl ChangeFilter {
    fn new(config: &WatchConfig) -> Self {
        let ignore_selectors = config
            .ignore_selectors
            .iter()
            .filter_map(|selector| match SelectorList::parse(selector) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!("Ignoring invalid watch selector '{}': {}", selector, e);
                    None
                }
            })
            .collect();
        Self {
            ignore_selectors,
            ignore_attributes: config
                .ignore_attributes
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_overlay(doc: &Document, node: NodeId) -> bool {
        doc.attribute(node, "id") == Some(CONTAINER_ID)
            || doc.attribute(node, "class").is_some_and(|classes| {
                classes
                    .split_ascii_whitespace()
                    .any(|class| class == OVERLAY_CLASS || class == TOOLTIP_CLASS)
            })
    }

    /// Whether `node` or any ancestor is overlay or matches an ignored
    /// selector
    fn is_ignored(&self, doc: &Document, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if Self::is_overlay(doc, current) {
                return true;
            }
            if doc.is_element(current) && self.ignore_selectors.iter().any(|list| list.matches(doc, current)) {
                return true;
            }
            cursor = doc.parent(current);
        }
        false
    }

    fn is_relevant(&self, doc: &Document, record: &MutationRecord) -> bool {
        if self.is_ignored(doc, record.target) {
            return false;
        }
        match &record.kind {
            MutationKind::ChildList { added, removed } => added
                .iter()
                .chain(removed)
                .any(|node| !self.is_ignored(doc, *node)),
            MutationKind::Attribute { name } => !self.ignore_attributes.contains(name),
            MutationKind::Text => true,
        }
    }
}

struct WatchState {
    last_seen: AtomicU64,
}

struct WatchHook {
    state: Arc<WatchState>,
}

impl RunHook for WatchHook {
    fn name(&self) -> &str {
        "watch"
    }

    fn on_run_complete(&self, doc: &mut Document, _results: &[SuiteResult]) {
        // Whatever the tests changed is not a reason to run again
        self.state.last_seen.store(doc.mutation_seq(), Ordering::SeqCst);
    }
}

pub struct WatchPlugin {
    config: WatchConfig,
}

impl WatchPlugin {
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }
}

impl Default for WatchPlugin {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}

#[derive(Clone)]
pub struct WatchHandle {
    runner: Runner,
    filter: Arc<ChangeFilter>,
    state: Arc<WatchState>,
    poll_interval: Duration,
}

impl WatchHandle {
    /// Relevant mutations since the last run
    pub fn pending_changes(&self) -> Vec<MutationRecord> {
        let doc = self.runner.document().read();
        doc.mutations_since(self.state.last_seen.load(Ordering::SeqCst))
            .iter()
            .filter(|record| self.filter.is_relevant(&doc, record))
            .cloned()
            .collect()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending_changes().is_empty()
    }

    /// Treat every change so far as seen
    pub fn mark_seen(&self) {
        let seq = self.runner.document().read().mutation_seq();
        self.state.last_seen.store(seq, Ordering::SeqCst);
    }

    /// Run the suites if relevant changes are pending
    pub async fn run_if_changed(&self) -> RunnerResult<Option<Vec<SuiteResult>>> {
        let pending = self.pending_changes();
        if pending.is_empty() {
            return Ok(None);
        }
        info!("{} relevant change(s) detected, re-running", pending.len());
        self.mark_seen();
        self.runner.run().await.map(Some)
    }

    /// Poll for changes in a background task until stopped
    pub fn start(&self) -> WatchLoop {
        let handle = self.clone();
        let (shutdown, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut runs = 0;
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = tokio::time::sleep(handle.poll_interval) => {
                        match handle.run_if_changed().await {
                            Ok(Some(_)) => runs += 1,
                            Ok(None) => {}
                            Err(RunnerError::AlreadyRunning) => debug!("Run in progress, waiting"),
                            Err(e) => warn!("Watch run failed: {}", e),
                        }
                    }
                }
            }
            debug!("Watch loop stopped after {} run(s)", runs);
            runs
        });
        WatchLoop { shutdown, task }
    }
}

/// Background watch task
pub struct WatchLoop {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<usize>,
}

impl WatchLoop {
    /// Stop polling and return how many runs were triggered
    pub async fn stop(self) -> usize {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(runs) => runs,
            Err(e) => {
                warn!("Watch task ended abnormally: {}", e);
                0
            }
        }
    }
}

impl Plugin for WatchPlugin {
    type Handle = WatchHandle;

    fn name(&self) -> &'static str {
        "watch"
    }

    fn install(self, runner: &Runner) -> WatchHandle {
        let state = Arc::new(WatchState {
            last_seen: AtomicU64::new(runner.document().read().mutation_seq()),
        });
        runner.add_hook(Arc::new(WatchHook {
            state: state.clone(),
        }));
        WatchHandle {
            runner: runner.clone(),
            filter: Arc::new(ChangeFilter::new(&self.config)),
            state,
            poll_interval: Duration::from_millis(self.config.poll_interval_ms.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecheck_common::{HighlightOptions, Highlighter};

    fn handle(html: &str) -> (Runner, WatchHandle) {
        let runner = Runner::new(Document::parse_html(html));
        let config = WatchConfig {
            ignore_selectors: vec!["#clock".to_string()],
            ..Default::default()
        };
        let handle = runner.install(WatchPlugin::new(config)).unwrap();
        (runner, handle)
    }

    #[test]
    fn overlays_and_ignored_changes_are_filtered() {
        let (runner, watch) = handle(r#"<main id="app"><span id="clock">12:00</span></main>"#);
        let doc = runner.document().clone();
        assert!(!watch.has_pending_changes());

        {
            let mut doc = doc.write();
            let app = doc.get_element_by_id("app").unwrap();
            let clock = doc.get_element_by_id("clock").unwrap();
            let mut highlighter = Highlighter::new();
            highlighter.highlight(&mut doc, app, HighlightOptions::default()).unwrap();
            highlighter.destroy(&mut doc).unwrap();
            doc.set_text_content(clock, "12:01").unwrap();
            doc.set_attribute(app, "style", "color:red").unwrap();
        }
        assert!(!watch.has_pending_changes());

        {
            let mut doc = doc.write();
            let app = doc.get_element_by_id("app").unwrap();
            doc.set_attribute(app, "aria-busy", "true").unwrap();
        }
        let pending = watch.pending_changes();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::Attribute { name: "aria-busy".to_string() });

        watch.mark_seen();
        assert!(!watch.has_pending_changes());
    }

    #[tokio::test]
    async fn run_if_changed_only_runs_on_changes() {
        let (runner, watch) = handle("<p id=p>x</p>");
        runner.describe("S", |suite| {
            suite.test("t", |_ctx| async { Ok(()) }).selector("p");
        });

        assert!(watch.run_if_changed().await.unwrap().is_none());
        {
            let mut doc = runner.document().write();
            let p = doc.get_element_by_id("p").unwrap();
            doc.set_attribute(p, "lang", "en").unwrap();
        }
        let results = watch.run_if_changed().await.unwrap().unwrap();
        assert_eq!(results[0].passed, 1);
        assert!(watch.run_if_changed().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn loop_reruns_until_stopped() {
        let runner = Runner::new(Document::parse_html("<p id=p>x</p>"));
        let watch = runner
            .install(WatchPlugin::new(WatchConfig {
                poll_interval_ms: 5,
                ..Default::default()
            }))
            .unwrap();
        runner.describe("S", |suite| {
            suite.test("t", |_ctx| async { Ok(()) });
        });

        let watch_loop = watch.start();
        {
            let mut doc = runner.document().write();
            let p = doc.get_element_by_id("p").unwrap();
            doc.set_text_content(p, "changed").unwrap();
        }
        for _ in 0..200 {
            if !watch.has_pending_changes() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(watch_loop.stop().await, 1);
    }
}
