//! Normalize Command

use anyhow::Result;
use clap::Args;
use pagecheck_common::{dedupe_urls, normalize_url, NormalizedUrl};
use pagecheck_runner::PagecheckConfig;
use serde::Serialize;

use crate::output::{print_error, print_list, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// URLs to normalize
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Keep non-tracking query parameters
    #[arg(long)]
    pub keep_query: bool,

    /// Keep the fragment
    #[arg(long)]
    pub keep_fragment: bool,

    /// Keep a leading www.
    #[arg(long)]
    pub keep_www: bool,

    /// Drop URLs equivalent to an earlier one
    #[arg(long)]
    pub dedupe: bool,
}

#[derive(Serialize)]
pub struct UrlDisplay {
    pub raw: String,
    pub full: String,
    pub hostname: String,
    pub domain: String,
    pub path: String,
}

impl From<NormalizedUrl> for UrlDisplay {
    fn from(url: NormalizedUrl) -> Self {
        Self {
            raw: url.raw,
            full: url.full,
            hostname: url.hostname,
            domain: url.domain,
            path: url.path,
        }
    }
}

impl TableDisplay for UrlDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Input", "Normalized", "Hostname", "Domain", "Path"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.raw.clone(),
            self.full.clone(),
            self.hostname.clone(),
            self.domain.clone(),
            self.path.clone(),
        ]
    }
}

#[derive(Serialize)]
pub struct DistinctUrl {
    pub url: String,
}

impl TableDisplay for DistinctUrl {
    fn headers() -> Vec<&'static str> {
        vec!["URL"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.url.clone()]
    }
}

pub fn execute(args: NormalizeArgs, config: &PagecheckConfig, format: OutputFormat) -> Result<bool> {
    let mut options = config.url.clone();
    options.keep_query_params |= args.keep_query;
    options.keep_fragment |= args.keep_fragment;
    options.remove_www &= !args.keep_www;

    if args.dedupe {
        let distinct: Vec<DistinctUrl> = dedupe_urls(&args.urls, &options)
            .into_iter()
            .map(|url| DistinctUrl { url })
            .collect();
        print_list(&distinct, format);
        return Ok(true);
    }

    let mut all_valid = true;
    let mut rows = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        match normalize_url(url, &options) {
            Ok(normalized) => rows.push(UrlDisplay::from(normalized)),
            Err(e) => {
                print_error(&format!("{}: {}", url, e));
                all_valid = false;
            }
        }
    }
    print_list(&rows, format);
    Ok(all_valid)
}
