//! Suite and test definitions

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::TestContext;
use crate::error::TestError;

pub type TestFuture = BoxFuture<'static, Result<(), TestError>>;

/// Test bodies and lifecycle hooks share one shape
pub type TestFn = Arc<dyn Fn(TestContext) -> TestFuture + Send + Sync>;

fn boxed<F, Fut>(f: F) -> TestFn
where
    F: Fn(TestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TestError>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// A registered test
#[derive(Clone)]
pub struct Test {
    pub(crate) name: String,
    pub(crate) selector: Option<String>,
    pub(crate) func: TestFn,
    pub(crate) skip: bool,
    pub(crate) todo: Option<String>,
    pub(crate) only: bool,
}

impl Test {
    /// Run only against elements matching `selector` inside each suite root
    pub fn selector(&mut self, selector: impl Into<String>) -> &mut Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn skip(&mut self) -> &mut Self {
        self.skip = true;
        self
    }

    pub fn todo(&mut self, reason: impl Into<String>) -> &mut Self {
        self.todo = Some(reason.into());
        self
    }

    pub fn only(&mut self) -> &mut Self {
        self.only = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector_str(&self) -> Option<&str> {
        self.selector.as_deref()
    }
}

/// A named group of tests, optionally scoped to the elements a root
/// selector matches
#[derive(Clone)]
pub struct Suite {
    pub(crate) name: String,
    pub(crate) selector: Option<String>,
    pub(crate) tests: Vec<Test>,
    pub(crate) before_each: Vec<TestFn>,
    pub(crate) after_each: Vec<TestFn>,
    pub(crate) only: bool,
    pub(crate) skip: bool,
}

impl Suite {
    pub(crate) fn new(name: &str, selector: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.map(str::to_string),
            tests: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            only: false,
            skip: false,
        }
    }

    /// Register a test. The returned builder sets selector and flags.
    pub fn test<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Test
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.tests.push(Test {
            name: name.into(),
            selector: None,
            func: boxed(f),
            skip: false,
            todo: None,
            only: false,
        });
        let last = self.tests.len() - 1;
        &mut self.tests[last]
    }

    /// Register a test that is reported as todo and never runs
    pub fn todo(&mut self, name: impl Into<String>, reason: impl Into<String>) -> &mut Test {
        let reason = reason.into();
        self.test(name, |_ctx| async { Ok(()) }).todo(reason)
    }

    pub fn before_each<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.before_each.push(boxed(f));
        self
    }

    pub fn after_each<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.after_each.push(boxed(f));
        self
    }

    pub fn scope(&mut self, selector: impl Into<String>) -> &mut Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn only(&mut self) -> &mut Self {
        self.only = true;
        self
    }

    pub fn skip(&mut self) -> &mut Self {
        self.skip = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub(crate) fn hook_count(&self) -> usize {
        self.before_each.len() + self.after_each.len()
    }

    pub(crate) fn is_focused(&self) -> bool {
        self.only || self.tests.iter().any(|t| t.only)
    }
}
