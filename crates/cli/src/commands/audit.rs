//! Audit Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use pagecheck_runner::builtin::register_accessibility_audit_at;
use pagecheck_runner::PagecheckConfig;

use super::{load_document, LevelArg, RunOptions, Session};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// HTML file to audit
    pub html: PathBuf,

    /// WCAG level for text contrast
    #[arg(long, value_enum)]
    pub level: Option<LevelArg>,

    #[command(flatten)]
    pub options: RunOptions,
}

pub async fn execute(args: AuditArgs, mut config: PagecheckConfig, format: OutputFormat) -> Result<bool> {
    args.options.apply(&mut config);
    if let Some(level) = args.level {
        config.plugins.contrast.level = level.into();
    }

    let session = Session::new(load_document(&args.html)?, &config)?;
    register_accessibility_audit_at(&session.runner, config.plugins.contrast.level);
    session.run(format).await
}
