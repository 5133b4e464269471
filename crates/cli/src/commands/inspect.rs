//! Inspect Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use pagecheck_common::{
    analyze_contrast, generate_selector, generate_xpath, get_accessible_description, get_accessible_name,
    get_role, is_focusable, is_hidden, Document, ElementQuery, NodeId,
};
use serde::Serialize;

use super::load_document;
use crate::output::{flag, print_list, print_warning, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// HTML file
    pub html: PathBuf,

    /// CSS selector of the elements to describe
    pub selector: String,
}

#[derive(Debug, Serialize)]
pub struct ElementDisplay {
    pub selector: String,
    pub xpath: String,
    pub tag: String,
    pub role: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub focusable: bool,
    pub hidden: bool,
    pub contrast: f64,
}

impl ElementDisplay {
    pub fn describe(doc: &Document, node: NodeId) -> Result<Self> {
        Ok(Self {
            selector: generate_selector(doc, node)?,
            xpath: generate_xpath(doc, node)?,
            tag: doc.tag_name(node).unwrap_or_default().to_string(),
            role: get_role(doc, node),
            name: get_accessible_name(doc, node),
            description: get_accessible_description(doc, node),
            focusable: is_focusable(doc, node),
            hidden: is_hidden(doc, node),
            contrast: analyze_contrast(doc, node).ratio,
        })
    }
}

impl TableDisplay for ElementDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Selector", "Tag", "Role", "Name", "Focusable", "Hidden", "Contrast"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.selector.clone(),
            self.tag.clone(),
            self.role.clone().unwrap_or_else(|| "-".to_string()),
            self.name.clone().map(|n| format!("\"{}\"", n)).unwrap_or_else(|| "-".to_string()),
            flag(self.focusable),
            flag(self.hidden),
            format!("{:.2}:1", self.contrast),
        ]
    }
}

pub fn execute(args: InspectArgs, format: OutputFormat) -> Result<bool> {
    let doc = load_document(&args.html)?;
    let nodes = doc.query_selector_all(doc.root(), &args.selector)?;
    if nodes.is_empty() {
        print_warning(&format!("No elements found for selector \"{}\"", args.selector));
        return Ok(false);
    }

    let rows = nodes
        .into_iter()
        .map(|node| ElementDisplay::describe(&doc, node))
        .collect::<Result<Vec<_>>>()?;
    print_list(&rows, format);
    Ok(true)
}
