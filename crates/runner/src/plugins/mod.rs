//! Optional instrumentation installed into a [`Runner`]
//!
//! Plugins observe a run through [`RunHook`](crate::RunHook) callbacks and
//! event listeners, and hand back a typed handle for reading what they
//! collected. Each plugin can be installed once per runner.

pub mod contrast;
pub mod isolation;
pub mod performance;
pub mod screenshot;
pub mod watch;

use crate::runner::Runner;

pub use contrast::{ContrastHandle, ContrastPlugin, ContrastRecord};
pub use isolation::{IsolationHandle, IsolationPlugin};
pub use performance::{ExecutionTiming, PerformanceHandle, PerformanceMetrics, PerformancePlugin};
pub use screenshot::{ScreenshotHandle, ScreenshotPlugin, ScreenshotRecord, VisualDiff};
pub use watch::{WatchHandle, WatchLoop, WatchPlugin};

pub trait Plugin {
    type Handle;

    /// Unique name; a runner refuses a second plugin with the same name
    fn name(&self) -> &'static str;

    fn install(self, runner: &Runner) -> Self::Handle;
}
