//! pagecheck common library
//!
//! DOM model, selector engine and the accessibility, heading, contrast,
//! URL and highlighting utilities shared by the pagecheck runner and CLI.
//! Everything DOM-facing is written against [`ElementQuery`], so it runs on
//! any tree that can answer parent/children/attribute/text queries.

pub mod a11y;
pub mod color;
pub mod dom;
pub mod error;
pub mod headings;
pub mod highlight;
pub mod query;
pub mod selector;
pub mod selector_gen;
pub mod urlnorm;

// Re-export commonly used types
pub use a11y::{
    get_accessible_description, get_accessible_name, get_implicit_role, get_input_role, get_role,
    is_focusable, is_hidden,
};
pub use color::{analyze_contrast, contrast_ratio, ContrastResult, Rgba, WcagLevel};
pub use dom::{Document, Element, MutationKind, MutationRecord, NodeId, NodeKind, Rect};
pub use error::{Error, Result};
pub use headings::{validate_heading_order, HeadingInfo, HeadingReport};
pub use highlight::{is_highlight_node, HighlightOptions, Highlighter, OverlayElement};
pub use query::ElementQuery;
pub use selector::SelectorList;
pub use selector_gen::{escape_ident, generate_selector, generate_xpath, resolve_xpath};
pub use urlnorm::{dedupe_urls, normalize_url, urls_equivalent, NormalizeOptions, NormalizedUrl};

/// pagecheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
