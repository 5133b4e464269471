//! Run Command

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use pagecheck_runner::builtin::register_accessibility_audit_at;
use pagecheck_runner::{PagecheckConfig, SuiteSpec};
use tracing::info;

use super::{load_document, RunOptions, Session};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// HTML file to test
    pub html: PathBuf,

    /// Directory of YAML suite files
    #[arg(short, long, default_value = "pagecheck")]
    pub specs: PathBuf,

    /// Run only suites with this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Also run the built-in accessibility audit
    #[arg(long)]
    pub audit: bool,

    #[command(flatten)]
    pub options: RunOptions,
}

pub async fn execute(args: RunArgs, mut config: PagecheckConfig, format: OutputFormat) -> Result<bool> {
    args.options.apply(&mut config);

    let specs = SuiteSpec::load_all(&args.specs)?;
    let selected: Vec<&SuiteSpec> = match &args.tag {
        Some(tag) => SuiteSpec::filter_by_tag(&specs, tag),
        None => specs.iter().collect(),
    };
    if selected.is_empty() && !args.audit {
        bail!("No suites found in {}", args.specs.display());
    }
    info!("Loaded {} suite(s) from {}", selected.len(), args.specs.display());

    let session = Session::new(load_document(&args.html)?, &config)?;
    for spec in selected {
        spec.register(&session.runner);
    }
    if args.audit {
        register_accessibility_audit_at(&session.runner, config.plugins.contrast.level);
    }
    session.run(format).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecheck_runner::config::ReporterKind;

    fn args(dir: &std::path::Path, tag: Option<&str>) -> RunArgs {
        RunArgs {
            html: dir.join("page.html"),
            specs: dir.join("specs"),
            tag: tag.map(str::to_string),
            audit: false,
            options: RunOptions {
                bail: false,
                timeout_ms: None,
                reporter: None,
                output_dir: None,
                perf: false,
                screenshots: false,
                update_baselines: false,
                isolate: false,
            },
        }
    }

    #[tokio::test]
    async fn runs_suites_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("specs")).unwrap();
        std::fs::write(dir.path().join("page.html"), r#"<main><a href="/">Home</a></main>"#).unwrap();
        std::fs::write(
            dir.path().join("specs/links.yaml"),
            "name: Links\ntags: [nav]\ntests:\n  - name: named\n    selector: a\n    checks:\n      - check: text_contains\n        text: Home\n",
        )
        .unwrap();

        let mut config = PagecheckConfig::default();
        config.report.reporter = ReporterKind::Minimal;

        assert!(execute(args(dir.path(), None), config.clone(), OutputFormat::Plain).await.unwrap());
        let missing = execute(args(dir.path(), Some("forms")), config, OutputFormat::Plain).await;
        assert!(missing.is_err());
    }
}
