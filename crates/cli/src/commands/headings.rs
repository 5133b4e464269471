//! Headings Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use pagecheck_common::{generate_selector, validate_heading_order, HeadingInfo};
use serde::Serialize;

use super::load_document;
use crate::output::{flag, print_list, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct HeadingsArgs {
    /// HTML file
    pub html: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct HeadingDisplay {
    pub level: u8,
    pub text: String,
    pub selector: String,
    pub valid: bool,
}

impl TableDisplay for HeadingDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Level", "Text", "Element", "Valid"]
    }

    fn row(&self) -> Vec<String> {
        // Indent by level so the outline reads as a tree
        let indent = "  ".repeat(self.level.saturating_sub(1) as usize);
        vec![
            format!("h{}", self.level),
            format!("{}{}", indent, self.text),
            self.selector.clone(),
            flag(self.valid),
        ]
    }
}

fn display(doc: &pagecheck_common::Document, heading: &HeadingInfo) -> HeadingDisplay {
    HeadingDisplay {
        level: heading.level,
        text: heading.text.clone(),
        selector: generate_selector(doc, heading.node).unwrap_or_default(),
        valid: heading.valid,
    }
}

pub fn execute(args: HeadingsArgs, format: OutputFormat) -> Result<bool> {
    let doc = load_document(&args.html)?;
    let report = validate_heading_order(&doc);
    let rows: Vec<HeadingDisplay> = report.headings.iter().map(|h| display(&doc, h)).collect();
    print_list(&rows, format);
    Ok(report.is_valid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_marks_the_break() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<h1>Top</h1><h2>Sub</h2><h4>Deep</h4>").unwrap();

        assert!(!execute(HeadingsArgs { html: path }, OutputFormat::Json).unwrap());

        let doc = pagecheck_common::Document::parse_html("<h1>Top</h1><h3>Skip</h3>");
        let report = validate_heading_order(&doc);
        let rows: Vec<HeadingDisplay> = report.headings.iter().map(|h| display(&doc, h)).collect();
        assert_eq!(rows[1].row(), vec!["h3", "    Skip", "html > body > h3", "no"]);
    }
}
