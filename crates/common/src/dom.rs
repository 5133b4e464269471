//! Arena-backed document model
//!
//! A [`Document`] owns every node in a flat `Vec`, addressed by [`NodeId`].
//! Removing a node detaches it from its parent but keeps its slot, so ids
//! handed out to callers (test contexts, overlays, events) never dangle.
//!
//! Every structural or attribute change is appended to a sequence-numbered
//! mutation log that watch-mode consumers read incrementally.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Index of a node inside its [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned box in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Shift the rect by the given offsets
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Element payload: lowercase tag name plus attributes in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag_name: String,
    attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_ascii_whitespace()
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attrs.push((name, value.to_string())),
        }
    }

    fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        before != self.attrs.len()
    }
}

/// What a node is
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    rect: Rect,
}

/// Kind of change recorded in the mutation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MutationKind {
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    Attribute {
        name: String,
    },
    Text,
}

/// One entry of the mutation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub seq: u64,
    pub target: NodeId,
    pub kind: MutationKind,
}

/// In-memory DOM tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    scroll: (f64, f64),
    viewport: (f64, f64),
    mutations: Vec<MutationRecord>,
    next_seq: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the document node
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Document,
            rect: Rect::default(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            scroll: (0.0, 0.0),
            viewport: (1280.0, 720.0),
            mutations: Vec::new(),
            next_seq: 1,
        }
    }

    /// Parse an HTML document. The parser always synthesizes `html`,
    /// `head` and `body`, like a browser does.
    pub fn parse_html(html: &str) -> Self {
        let parsed = scraper::Html::parse_document(html);
        let mut doc = Self::new();

        let mut stack = Vec::new();
        for child in parsed.tree.root().children() {
            stack.push((child, doc.root));
        }
        stack.reverse();

        while let Some((node, parent)) = stack.pop() {
            let created = match node.value() {
                scraper::Node::Element(el) => {
                    let mut element = Element::new(el.name());
                    for (name, value) in el.attrs() {
                        element.set_attr(name, value);
                    }
                    Some(doc.push_node(Some(parent), NodeKind::Element(element)))
                }
                scraper::Node::Text(text) => {
                    let content: &str = text;
                    Some(doc.push_node(Some(parent), NodeKind::Text(content.to_string())))
                }
                scraper::Node::Comment(comment) => {
                    let content: &str = comment;
                    Some(doc.push_node(Some(parent), NodeKind::Comment(content.to_string())))
                }
                _ => None,
            };

            if let Some(created) = created {
                let children: Vec<_> = node.children().collect();
                for child in children.into_iter().rev() {
                    stack.push((child, created));
                }
            }
        }

        // Parsing is not a mutation anyone should react to.
        doc.mutations.clear();
        doc
    }

    /// Read and parse an HTML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse_html(&content))
    }

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
            rect: Rect::default(),
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::NodeNotFound(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(Error::NodeNotFound(id.0))
    }

    fn record(&mut self, target: NodeId, kind: MutationKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.mutations.push(MutationRecord { seq, target, kind });
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|node| &node.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// The `<html>` element, if present
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .iter()
            .copied()
            .find(|child| self.element(*child).is_some())
    }

    fn top_level_child(&self, tag: &str) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|child| self.element(*child).is_some_and(|e| e.tag_name() == tag))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.top_level_child("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.top_level_child("body")
    }

    /// Whether the node is attached to the document tree
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.push_node(None, NodeKind::Element(Element::new(tag_name)))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(None, NodeKind::Text(text.to_string()))
    }

    /// Append `child` as the last child of `parent`, moving it if it is
    /// already attached somewhere else
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if matches!(self.node(parent)?.kind, NodeKind::Text(_) | NodeKind::Comment(_)) {
            return Err(Error::InvalidOperation(format!(
                "cannot append to non-container node {}",
                parent
            )));
        }
        self.node(child)?;
        if child == parent || self.is_descendant_of(parent, child) {
            return Err(Error::InvalidOperation(format!(
                "cannot append {} inside itself",
                child
            )));
        }
        if self.parent(child).is_some() {
            self.remove(child)?;
        }

        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.record(
            parent,
            MutationKind::ChildList {
                added: vec![child],
                removed: Vec::new(),
            },
        );
        Ok(())
    }

    /// Detach a node from its parent. The node and its subtree stay
    /// addressable and can be re-attached.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|child| *child != id);
        self.node_mut(id)?.parent = None;
        self.record(
            parent,
            MutationKind::ChildList {
                added: Vec::new(),
                removed: vec![id],
            },
        );
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element(element) => element.set_attr(name, value),
            _ => return Err(Error::NotAnElement(id.0)),
        }
        self.record(
            id,
            MutationKind::Attribute {
                name: name.to_ascii_lowercase(),
            },
        );
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<bool> {
        let removed = match &mut self.node_mut(id)?.kind {
            NodeKind::Element(element) => element.remove_attr(name),
            _ => return Err(Error::NotAnElement(id.0)),
        };
        if removed {
            self.record(
                id,
                MutationKind::Attribute {
                    name: name.to_ascii_lowercase(),
                },
            );
        }
        Ok(removed)
    }

    /// Replace the children of `id` with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<()> {
        if let NodeKind::Text(existing) = &mut self.node_mut(id)?.kind {
            *existing = text.to_string();
            self.record(id, MutationKind::Text);
            return Ok(());
        }

        let removed = std::mem::take(&mut self.node_mut(id)?.children);
        for child in &removed {
            self.nodes[child.0].parent = None;
        }
        let text_node = self.push_node(Some(id), NodeKind::Text(text.to_string()));
        self.record(
            id,
            MutationKind::ChildList {
                added: vec![text_node],
                removed,
            },
        );
        Ok(())
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) -> Result<()> {
        self.node_mut(id)?.rect = rect;
        Ok(())
    }

    /// Viewport-relative bounding rect
    pub fn rect(&self, id: NodeId) -> Rect {
        self.nodes.get(id.0).map(|node| node.rect).unwrap_or_default()
    }

    pub fn scroll_offset(&self) -> (f64, f64) {
        self.scroll
    }

    pub fn set_scroll_offset(&mut self, x: f64, y: f64) {
        self.scroll = (x, y);
    }

    pub fn viewport(&self) -> (f64, f64) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = (width, height);
    }

    /// Sequence number of the most recent mutation (0 when none)
    pub fn mutation_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Mutations recorded after `seq`
    pub fn mutations_since(&self, seq: u64) -> &[MutationRecord] {
        let start = self.mutations.partition_point(|record| record.seq <= seq);
        &self.mutations[start..]
    }

    pub fn clear_mutations(&mut self) {
        self.mutations.clear();
    }

    /// Serialize a node and its subtree back to HTML
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Document) => {
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
            }
            Some(NodeKind::Element(element)) => {
                out.push('<');
                out.push_str(element.tag_name());
                for (name, value) in element.attrs() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value, true));
                    out.push('"');
                }
                out.push('>');
                if is_void_element(element.tag_name()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(element.tag_name());
                out.push('>');
            }
            Some(NodeKind::Text(text)) => out.push_str(&escape_html(text, false)),
            Some(NodeKind::Comment(text)) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            None => {}
        }
    }
}

fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

fn escape_html(value: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_builds_html_head_body() {
        let doc = Document::parse_html("<p id=\"a\">Hello</p>");
        let html = doc.document_element().unwrap();
        assert_eq!(doc.element(html).unwrap().tag_name(), "html");
        assert!(doc.head().is_some());
        let body = doc.body().unwrap();
        let p = doc.children(body)[0];
        assert_eq!(doc.element(p).unwrap().attr("id"), Some("a"));
        assert!(doc.mutations_since(0).is_empty());
    }

    #[test]
    fn append_moves_and_records() {
        let mut doc = Document::parse_html("<div id=\"a\"></div><div id=\"b\"></div>");
        let body = doc.body().unwrap();
        let a = doc.children(body)[0];
        let b = doc.children(body)[1];
        let span = doc.create_element("SPAN");
        assert!(!doc.is_connected(span));

        doc.append_child(a, span).unwrap();
        doc.append_child(b, span).unwrap();

        assert!(doc.children(a).is_empty());
        assert_eq!(doc.children(b), &[span]);
        assert_eq!(doc.element(span).unwrap().tag_name(), "span");
        // append, detach from a, append to b
        assert_eq!(doc.mutations_since(0).len(), 3);
        assert_eq!(doc.mutations_since(2).len(), 1);
    }

    #[test]
    fn append_rejects_cycles() {
        let mut doc = Document::parse_html("<div><p></p></div>");
        let body = doc.body().unwrap();
        let div = doc.children(body)[0];
        let p = doc.children(div)[0];
        assert!(doc.append_child(p, div).is_err());
    }

    #[test]
    fn attributes_are_case_insensitive() {
        let mut doc = Document::new();
        let el = doc.create_element("div");
        doc.set_attribute(el, "Data-X", "1").unwrap();
        assert_eq!(doc.element(el).unwrap().attr("data-x"), Some("1"));
        assert!(doc.remove_attribute(el, "DATA-X").unwrap());
        assert!(!doc.remove_attribute(el, "data-x").unwrap());
    }

    #[test]
    fn outer_html_round_trips_simple_markup() {
        let doc = Document::parse_html("<ul class=\"x\"><li>a &amp; b</li><li><br></li></ul>");
        let body = doc.body().unwrap();
        let ul = doc.children(body)[0];
        assert_eq!(
            doc.outer_html(ul),
            "<ul class=\"x\"><li>a &amp; b</li><li><br></li></ul>"
        );
    }
}
