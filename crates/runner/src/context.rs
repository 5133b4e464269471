//! Per-execution test context

use std::sync::Arc;

use pagecheck_common::{
    a11y, analyze_contrast, generate_selector, ContrastResult, Document, ElementQuery, NodeId,
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::TestError;

/// Document shared between the runner, test functions and plugins.
///
/// Guards must not be held across an `.await`.
pub type SharedDocument = Arc<RwLock<Document>>;

pub fn share(document: Document) -> SharedDocument {
    Arc::new(RwLock::new(document))
}

/// Runtime outcome requested by the test itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Control {
    Skip(Option<String>),
    Todo(String),
}

/// Handed to every test function and hook: the bound element plus
/// skip/todo controls and query helpers
#[derive(Clone)]
pub struct TestContext {
    document: SharedDocument,
    element: NodeId,
    suite: Arc<str>,
    test: Arc<str>,
    control: Arc<Mutex<Option<Control>>>,
}

impl TestContext {
    pub(crate) fn new(document: SharedDocument, element: NodeId, suite: &str, test: &str) -> Self {
        Self {
            document,
            element,
            suite: Arc::from(suite),
            test: Arc::from(test),
            control: Arc::new(Mutex::new(None)),
        }
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn suite_name(&self) -> &str {
        &self.suite
    }

    pub fn test_name(&self) -> &str {
        &self.test
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Document> {
        self.document.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.document.write()
    }

    /// Mark this execution skipped. Return the error to stop early:
    /// `return Err(ctx.skip("no form on page"))`.
    pub fn skip(&self, reason: impl Into<String>) -> TestError {
        let reason = Some(reason.into()).filter(|r| !r.is_empty());
        *self.control.lock() = Some(Control::Skip(reason.clone()));
        TestError::Skipped(reason)
    }

    /// Mark this execution as a todo with the given reason
    pub fn todo(&self, reason: impl Into<String>) -> TestError {
        let reason = reason.into();
        *self.control.lock() = Some(Control::Todo(reason.clone()));
        TestError::Todo(reason)
    }

    pub(crate) fn control(&self) -> Option<Control> {
        self.control.lock().clone()
    }

    pub fn tag_name(&self) -> Option<String> {
        self.read().tag_name(self.element).map(str::to_string)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.read().attribute(self.element, name).map(str::to_string)
    }

    pub fn text(&self) -> String {
        self.read().text_content(self.element)
    }

    pub fn accessible_name(&self) -> Option<String> {
        a11y::get_accessible_name(&*self.read(), self.element)
    }

    pub fn accessible_description(&self) -> Option<String> {
        a11y::get_accessible_description(&*self.read(), self.element)
    }

    pub fn role(&self) -> Option<String> {
        a11y::get_role(&*self.read(), self.element)
    }

    pub fn is_focusable(&self) -> bool {
        a11y::is_focusable(&*self.read(), self.element)
    }

    pub fn is_hidden(&self) -> bool {
        a11y::is_hidden(&*self.read(), self.element)
    }

    pub fn contrast(&self) -> ContrastResult {
        analyze_contrast(&*self.read(), self.element)
    }

    /// Elements under the bound element matching `selector`
    pub fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, TestError> {
        Ok(self.read().query_selector_all(self.element, selector)?)
    }

    /// Generated CSS selector of the bound element
    pub fn selector(&self) -> String {
        element_selector(&self.read(), self.element)
    }
}

/// CSS selector for reports; the document node has none
pub(crate) fn element_selector(doc: &Document, node: NodeId) -> String {
    if node == doc.root() {
        return "#document".to_string();
    }
    generate_selector(doc, node).unwrap_or_else(|_| node.to_string())
}
