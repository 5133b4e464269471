//! Stable CSS selector and XPath generation for elements
//!
//! Generated paths favour readability: an `id` short-circuits the whole
//! walk, classes starting with `_` (scoped, build-generated names) are left
//! out, and positional indices appear only where same-tag siblings make
//! them necessary.

use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::query::ElementQuery;

const MAX_CLASSES: usize = 3;

/// Escape a string for use as a CSS identifier, following `CSS.escape`
pub fn escape_ident(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());

    for (i, &ch) in chars.iter().enumerate() {
        let code = ch as u32;
        if ch == '\0' {
            out.push('\u{FFFD}');
        } else if (1..=0x1f).contains(&code)
            || code == 0x7f
            || (i == 0 && ch.is_ascii_digit())
            || (i == 1 && ch.is_ascii_digit() && chars[0] == '-')
        {
            out.push_str(&format!("\\{:x} ", code));
        } else if i == 0 && ch == '-' && chars.len() == 1 {
            out.push_str("\\-");
        } else if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            out.push(ch);
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

fn same_tag_siblings<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Vec<NodeId> {
    let tag = dom.tag_name(node);
    match dom.parent(node) {
        Some(parent) => dom
            .element_children(parent)
            .into_iter()
            .filter(|sibling| dom.tag_name(*sibling) == tag)
            .collect(),
        None => vec![node],
    }
}

fn selector_segment<D: ElementQuery + ?Sized>(dom: &D, node: NodeId, tag: &str) -> String {
    let mut segment = tag.to_string();

    let classes = dom
        .attribute(node, "class")
        .unwrap_or_default()
        .split_ascii_whitespace()
        .filter(|class_name| !class_name.starts_with('_'))
        .take(MAX_CLASSES);
    for class_name in classes {
        segment.push('.');
        segment.push_str(&escape_ident(class_name));
    }

    if same_tag_siblings(dom, node).len() > 1 {
        if let Some(parent) = dom.parent(node) {
            let position = dom
                .element_children(parent)
                .iter()
                .position(|sibling| *sibling == node)
                .unwrap_or(0);
            segment.push_str(&format!(":nth-child({})", position + 1));
        }
    }
    segment
}

/// Build a CSS selector that identifies `node`
pub fn generate_selector<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Result<String> {
    if !dom.is_element(node) {
        return Err(Error::NotAnElement(node.0));
    }
    if let Some(id) = dom.attribute(node, "id").filter(|id| !id.is_empty()) {
        return Ok(format!("#{}", escape_ident(id)));
    }

    let mut segments = Vec::new();
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        let Some(tag) = dom.tag_name(current) else {
            break;
        };
        segments.push(selector_segment(dom, current, tag));
        cursor = dom.parent(current);
    }
    segments.reverse();
    Ok(segments.join(" > "))
}

/// Build an absolute XPath for `node`
pub fn generate_xpath<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Result<String> {
    if !dom.is_element(node) {
        return Err(Error::NotAnElement(node.0));
    }
    if let Some(id) = dom.attribute(node, "id").filter(|id| !id.is_empty()) {
        return Ok(format!("//*[@id=\"{}\"]", id));
    }

    let mut segments = Vec::new();
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        let Some(tag) = dom.tag_name(current) else {
            break;
        };
        let siblings = same_tag_siblings(dom, current);
        if siblings.len() > 1 {
            let index = siblings.iter().position(|s| *s == current).unwrap_or(0) + 1;
            segments.push(format!("/{}[{}]", tag, index));
        } else {
            segments.push(format!("/{}", tag));
        }
        cursor = dom.parent(current);
    }
    segments.reverse();
    Ok(segments.concat())
}

/// Resolve an XPath in the shapes produced by [`generate_xpath`]:
/// `//*[@id="..."]` or an absolute `/tag[n]/...` path
pub fn resolve_xpath<D: ElementQuery + ?Sized>(dom: &D, xpath: &str) -> Result<Option<NodeId>> {
    let invalid = || Error::InvalidXPath(xpath.to_string());

    if let Some(rest) = xpath.strip_prefix("//*[@id=\"") {
        let id = rest.strip_suffix("\"]").ok_or_else(invalid)?;
        return Ok(dom.get_element_by_id(id));
    }

    let path = xpath.strip_prefix('/').ok_or_else(invalid)?;
    let mut current = dom.root();
    for step in path.split('/') {
        let (tag, index) = match step.split_once('[') {
            Some((tag, rest)) => {
                let index = rest
                    .strip_suffix(']')
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(invalid)?;
                (tag, index)
            }
            None => (step, 1),
        };
        if tag.is_empty() {
            return Err(invalid());
        }
        let candidates: Vec<NodeId> = dom
            .element_children(current)
            .into_iter()
            .filter(|child| dom.tag_name(*child).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .collect();
        match candidates.get(index - 1) {
            Some(next) => current = *next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn fixture() -> Document {
        Document::parse_html(
            r#"<div class="card _x1 a b c d"><p>one</p><p>two</p><span>s</span></div>
               <div><p id="9 lives">id</p></div>"#,
        )
    }

    #[test]
    fn id_short_circuits() {
        let doc = fixture();
        let p = doc.query_selector(doc.root(), "p[id]").unwrap().unwrap();
        assert_eq!(generate_selector(&doc, p).unwrap(), r"#\39 \ lives");
        assert_eq!(generate_xpath(&doc, p).unwrap(), r#"//*[@id="9 lives"]"#);
    }

    #[test]
    fn path_filters_classes_and_indexes_same_tag_siblings() {
        let doc = fixture();
        let second_p = doc
            .query_selector(doc.root(), "div.card p:nth-child(2)")
            .unwrap()
            .unwrap();
        assert_eq!(
            generate_selector(&doc, second_p).unwrap(),
            "html > body > div.card.a.b:nth-child(1) > p:nth-child(2)"
        );
        let span = doc.query_selector(doc.root(), "span").unwrap().unwrap();
        assert_eq!(
            generate_xpath(&doc, span).unwrap(),
            "/html/body/div[1]/span"
        );
    }

    #[test]
    fn selector_round_trips() {
        let doc = fixture();
        for node in doc.descendant_elements(doc.root()) {
            let selector = generate_selector(&doc, node).unwrap();
            let found = doc.query_selector(doc.root(), &selector).unwrap();
            assert_eq!(found, Some(node), "selector {selector}");
        }
    }

    #[test]
    fn xpath_round_trips() {
        let doc = fixture();
        for node in doc.descendant_elements(doc.root()) {
            let xpath = generate_xpath(&doc, node).unwrap();
            assert_eq!(resolve_xpath(&doc, &xpath).unwrap(), Some(node), "xpath {xpath}");
        }
        assert!(resolve_xpath(&doc, "html/body").is_err());
        assert_eq!(resolve_xpath(&doc, "/html/body/div[7]").unwrap(), None);
    }

    #[test]
    fn escape_matches_css_escape() {
        assert_eq!(escape_ident("a b"), r"a\ b");
        assert_eq!(escape_ident("1a"), r"\31 a");
        assert_eq!(escape_ident("-1"), r"-\31 ");
        assert_eq!(escape_ident("-"), r"\-");
        assert_eq!(escape_ident("ünï_-"), "ünï_-");
    }
}
