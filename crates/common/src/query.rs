//! Minimal element-query capability
//!
//! Every DOM utility in this crate is written against [`ElementQuery`]
//! rather than against [`Document`] directly, so the analysis code runs on
//! anything that can answer these questions: the arena document, a
//! snapshot, or a hand-built fake in a test.

use crate::dom::{Document, NodeId, NodeKind, Rect};
use crate::error::Result;
use crate::selector::SelectorList;

pub trait ElementQuery {
    /// The document node
    fn root(&self) -> NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> &[NodeId];

    /// The arena slot of `node`; selector matching keys its caches on the
    /// slot's address
    fn node_kind(&self, node: NodeId) -> Option<&NodeKind>;

    /// Lowercase tag name, `None` for non-element nodes
    fn tag_name(&self, node: NodeId) -> Option<&str>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    /// Data of a text node, `None` for anything else
    fn text(&self, node: NodeId) -> Option<&str>;

    /// Viewport-relative bounding rect
    fn bounding_rect(&self, node: NodeId) -> Rect;

    fn is_element(&self, node: NodeId) -> bool {
        self.tag_name(node).is_some()
    }

    fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.is_element(*parent))
    }

    fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    /// Concatenated text of all descendant text nodes
    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(text) = self.text(current) {
                out.push_str(text);
                continue;
            }
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Element descendants of `node` in document order, excluding `node`
    fn descendant_elements(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.is_element(current) {
                out.push(current);
            }
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendant_elements(self.root())
            .into_iter()
            .find(|node| self.attribute(*node, "id") == Some(id))
    }

    /// All elements under `scope` matching `selector`, in document order
    fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendant_elements(scope)
            .into_iter()
            .filter(|node| list.matches(self, *node))
            .collect())
    }

    fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendant_elements(scope)
            .into_iter()
            .find(|node| list.matches(self, *node)))
    }

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool> {
        Ok(SelectorList::parse(selector)?.matches(self, node))
    }
}

impl ElementQuery for Document {
    fn root(&self) -> NodeId {
        Document::root(self)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        Document::parent(self, node)
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        Document::children(self, node)
    }

    fn node_kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.kind(node)
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag_name())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|element| element.attr(name))
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            Some(NodeKind::Text(text)) => Some(text),
            _ => None,
        }
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        self.rect(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_scoped_to_descendants() {
        let doc = Document::parse_html(
            "<section id=\"s\"><p>one</p></section><p>two</p>",
        );
        let section = doc.get_element_by_id("s").unwrap();
        let all = doc.query_selector_all(doc.root(), "p").unwrap();
        let scoped = doc.query_selector_all(section, "p").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(scoped.len(), 1);
        assert_eq!(doc.text_content(scoped[0]), "one");
    }

    #[test]
    fn text_content_joins_in_order() {
        let doc = Document::parse_html("<div id=\"d\">a<b>b</b>c</div>");
        let div = doc.get_element_by_id("d").unwrap();
        assert_eq!(doc.text_content(div), "abc");
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let doc = Document::new();
        assert!(doc.query_selector_all(doc.root(), "div[").is_err());
        assert!(doc.query_selector(doc.root(), "").is_err());
    }
}
