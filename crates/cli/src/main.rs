//! pagecheck CLI - Main Entry Point
//!
//! Audits HTML documents for accessibility problems, runs YAML suites
//! against them and exposes the DOM utilities (URL normalization, element
//! inspection, heading outline) on the command line.
//!
//! Exit codes: 0 when everything passed, 1 when a check failed, 2 on error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pagecheck_runner::PagecheckConfig;

mod commands;
mod output;

use commands::{audit, headings, inspect, normalize, run};

/// pagecheck - selector-driven accessibility checks for HTML
#[derive(Parser)]
#[command(name = "pagecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = PagecheckConfig::FILE_NAME, global = true, env = "PAGECHECK_CONFIG")]
    config: PathBuf,

    /// Output format for tables
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in accessibility audit
    Audit(audit::AuditArgs),

    /// Run YAML suites against a document
    Run(run::RunArgs),

    /// Normalize URLs
    Normalize(normalize::NormalizeArgs),

    /// Describe the elements matching a selector
    Inspect(inspect::InspectArgs),

    /// Show and validate the heading outline
    Headings(headings::HeadingsArgs),
}

async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    let config = PagecheckConfig::load(&cli.config)?;
    match cli.command {
        Commands::Audit(args) => audit::execute(args, config, cli.format).await,
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Normalize(args) => normalize::execute(args, &config, cli.format),
        Commands::Inspect(args) => inspect::execute(args, cli.format),
        Commands::Headings(args) => headings::execute(args, cli.format),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
