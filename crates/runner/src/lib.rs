//! pagecheck test runner
//!
//! Registers suites of tests that run once per element matching a CSS
//! selector, executes them sequentially against a shared [`Document`] and
//! reports each execution as an event.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Runner (clone = handle)                                    │
//! │    ├── describe / describe_within -> Suite                  │
//! │    │     ├── before_each / after_each                       │
//! │    │     └── test(name, fn).selector(css).skip/todo/only    │
//! │    ├── on / off / stream / attach_reporter                  │
//! │    ├── install(Plugin) -> Handle                            │
//! │    └── run() -> Vec<SuiteResult>                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Events: run-start, suite-start, test-start, test-result,   │
//! │          suite-complete, test-complete                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Plugins: performance, contrast, screenshot, isolation,     │
//! │           watch                                             │
//! │  Reporters: console, json, minimal                          │
//! │  Suites from YAML (SuiteSpec), built-in a11y audit          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Document`]: pagecheck_common::Document

pub mod builtin;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod plugins;
pub mod reporter;
pub mod runner;
pub mod spec;
pub mod suite;

pub use config::{PagecheckConfig, RunnerConfig};
pub use context::{share, SharedDocument, TestContext};
pub use error::{ensure, ensure_eq, RunnerError, RunnerResult, TestError};
pub use events::{EventKind, Outcome, RunSummary, SuiteResult, TestEvent, TestResult};
pub use plugins::Plugin;
pub use reporter::{ConsoleReporter, JsonReporter, MinimalReporter, Reporter};
pub use runner::{EventStream, Execution, ListenerId, RunHook, Runner};
pub use spec::{Check, SuiteSpec, TestSpec};
pub use suite::{Suite, Test};
