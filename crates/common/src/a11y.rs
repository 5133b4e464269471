//! Accessible name, description, role and focusability
//!
//! A simplified subset of the accessible-name computation: enough to tell
//! whether a control announces something meaningful, not a full
//! implementation of the W3C algorithm.

use crate::dom::NodeId;
use crate::query::ElementQuery;

/// Compute the accessible name of an element.
///
/// Sources are tried in order: `aria-labelledby`, `aria-label`, an
/// associated `<label>` (form controls only), `alt` (images only), then the
/// trimmed text content. An empty `alt` is an explicit empty name and
/// returns `Some("")`; `None` means no source applied at all.
pub fn get_accessible_name<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Option<String> {
    let tag = dom.tag_name(node)?;

    if let Some(ids) = dom.attribute(node, "aria-labelledby") {
        let joined = referenced_text(dom, ids);
        if !joined.is_empty() {
            return Some(joined);
        }
    }

    if let Some(label) = dom.attribute(node, "aria-label") {
        let label = label.trim();
        if !label.is_empty() {
            return Some(label.to_string());
        }
    }

    if is_labelable(tag) {
        if let Some(label) = associated_label(dom, node) {
            let text = normalize_whitespace(&dom.text_content(label));
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    if tag == "img" || (tag == "input" && dom.attribute(node, "type") == Some("image")) {
        if let Some(alt) = dom.attribute(node, "alt") {
            return Some(alt.trim().to_string());
        }
    }

    let text = normalize_whitespace(&dom.text_content(node));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `aria-describedby` text, else `title`, else `None`
pub fn get_accessible_description<D: ElementQuery + ?Sized>(
    dom: &D,
    node: NodeId,
) -> Option<String> {
    if let Some(ids) = dom.attribute(node, "aria-describedby") {
        let joined = referenced_text(dom, ids);
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    dom.attribute(node, "title")
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
}

fn referenced_text<D: ElementQuery + ?Sized>(dom: &D, ids: &str) -> String {
    ids.split_ascii_whitespace()
        .filter_map(|id| dom.get_element_by_id(id))
        .map(|target| normalize_whitespace(&dom.text_content(target)))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_labelable(tag: &str) -> bool {
    matches!(
        tag,
        "input" | "select" | "textarea" | "button" | "meter" | "output" | "progress"
    )
}

/// The `<label for=id>` pointing at `node`, else the nearest wrapping label
fn associated_label<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Option<NodeId> {
    if let Some(id) = dom.attribute(node, "id").filter(|id| !id.is_empty()) {
        let by_for = dom
            .descendant_elements(dom.root())
            .into_iter()
            .find(|candidate| {
                dom.tag_name(*candidate) == Some("label") && dom.attribute(*candidate, "for") == Some(id)
            });
        if by_for.is_some() {
            return by_for;
        }
    }

    let mut cursor = dom.parent_element(node);
    while let Some(ancestor) = cursor {
        if dom.tag_name(ancestor) == Some("label") {
            return Some(ancestor);
        }
        cursor = dom.parent_element(ancestor);
    }
    None
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Role implied by the tag name alone
pub fn get_implicit_role<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Option<&'static str> {
    let tag = dom.tag_name(node)?;
    let role = match tag {
        "input" => return Some(get_input_role(dom, node)),
        "a" | "area" => {
            if dom.has_attribute(node, "href") {
                "link"
            } else {
                return None;
            }
        }
        "article" => "article",
        "aside" => "complementary",
        "button" => "button",
        "datalist" => "listbox",
        "details" => "group",
        "dialog" => "dialog",
        "fieldset" => "group",
        "figure" => "figure",
        "footer" => "contentinfo",
        "form" => "form",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        "header" => "banner",
        "hr" => "separator",
        "img" => {
            if dom.attribute(node, "alt") == Some("") {
                "presentation"
            } else {
                "img"
            }
        }
        "li" => "listitem",
        "main" => "main",
        "math" => "math",
        "menu" | "ol" | "ul" => "list",
        "meter" => "meter",
        "nav" => "navigation",
        "option" => "option",
        "output" => "status",
        "progress" => "progressbar",
        "section" => "region",
        "select" => {
            if dom.has_attribute(node, "multiple") {
                "listbox"
            } else {
                "combobox"
            }
        }
        "summary" => "button",
        "table" => "table",
        "tbody" | "thead" | "tfoot" => "rowgroup",
        "td" => "cell",
        "textarea" => "textbox",
        "th" => "columnheader",
        "tr" => "row",
        _ => return None,
    };
    Some(role)
}

/// Role of an `<input>` by its `type`
pub fn get_input_role<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> &'static str {
    let input_type = dom
        .attribute(node, "type")
        .map(|t| t.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match input_type.as_str() {
        "button" | "image" | "reset" | "submit" => "button",
        "checkbox" => "checkbox",
        "radio" => "radio",
        "range" => "slider",
        "number" => "spinbutton",
        "search" => "searchbox",
        _ => "textbox",
    }
}

/// Explicit `role` (first token) if present, else the implicit role
pub fn get_role<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Option<String> {
    if let Some(explicit) = dom
        .attribute(node, "role")
        .and_then(|role| role.split_ascii_whitespace().next())
    {
        return Some(explicit.to_ascii_lowercase());
    }
    get_implicit_role(dom, node).map(str::to_string)
}

/// Whether the element takes part in sequential keyboard navigation or can
/// be focused programmatically.
///
/// An explicit `tabindex` decides on its own: any non-negative value makes
/// the element focusable, a negative one removes it.
pub fn is_focusable<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    let Some(tag) = dom.tag_name(node) else {
        return false;
    };

    if let Some(tabindex) = dom.attribute(node, "tabindex") {
        if let Ok(value) = tabindex.trim().parse::<i64>() {
            return value >= 0;
        }
    }

    if dom.has_attribute(node, "disabled") || is_inert(dom, node) {
        return false;
    }

    match tag {
        "button" | "select" | "textarea" | "iframe" => true,
        "input" => !dom
            .attribute(node, "type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden")),
        "a" | "area" => dom.has_attribute(node, "href"),
        "audio" | "video" => dom.has_attribute(node, "controls"),
        _ => dom
            .attribute(node, "contenteditable")
            .is_some_and(|value| !value.eq_ignore_ascii_case("false")),
    }
}

fn is_inert<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if dom.has_attribute(current, "inert") {
            return true;
        }
        cursor = dom.parent_element(current);
    }
    false
}

/// Hidden from assistive technology by markup or inline style on the
/// element or any ancestor
pub fn is_hidden<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if dom.has_attribute(current, "hidden")
            || dom.attribute(current, "aria-hidden") == Some("true")
        {
            return true;
        }
        if let Some(style) = dom.attribute(current, "style") {
            let style = crate::color::parse_inline_style(style);
            if style.get("display").map(String::as_str) == Some("none")
                || style.get("visibility").map(String::as_str) == Some("hidden")
            {
                return true;
            }
        }
        cursor = dom.parent_element(current);
    }
    false
}
