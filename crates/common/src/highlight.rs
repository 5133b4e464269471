//! Element highlighter
//!
//! Draws absolutely positioned overlay boxes over elements inside a single
//! shared container appended to the body. Highlighted elements themselves
//! are never touched; everything lives under the container, which watch
//! mode recognises by [`CONTAINER_ID`] and ignores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dom::{Document, NodeId, Rect};
use crate::error::{Error, Result};
use crate::query::ElementQuery;

pub const CONTAINER_ID: &str = "pagecheck-highlight-container";
pub const OVERLAY_CLASS: &str = "pagecheck-highlight";
pub const TOOLTIP_CLASS: &str = "pagecheck-highlight-tooltip";
/// Largest 32-bit z-index, keeps overlays above page content
pub const OVERLAY_Z_INDEX: u32 = 2_147_483_647;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightOptions {
    pub border_color: String,
    pub border_width: f64,
    pub border_style: String,
    pub background_color: String,
    pub tooltip: Option<String>,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            border_color: "#ff0000".to_string(),
            border_width: 2.0,
            border_style: "solid".to_string(),
            background_color: "rgba(255, 0, 0, 0.1)".to_string(),
            tooltip: None,
        }
    }
}

impl HighlightOptions {
    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }
}

/// A tracked element and the overlay nodes drawn for it
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayElement {
    pub element: NodeId,
    pub overlay: NodeId,
    pub tooltip: Option<NodeId>,
    pub options: HighlightOptions,
}

fn overlay_style(rect: Rect, options: &HighlightOptions) -> String {
    format!(
        "position:absolute;left:{}px;top:{}px;width:{}px;height:{}px;\
         border:{}px {} {};background-color:{};z-index:{};\
         pointer-events:none;box-sizing:border-box",
        rect.x,
        rect.y,
        rect.width,
        rect.height,
        options.border_width,
        options.border_style,
        options.border_color,
        options.background_color,
        OVERLAY_Z_INDEX,
    )
}

const TOOLTIP_STYLE: &str = "position:absolute;left:0;bottom:100%;background-color:#333;\
     color:#fff;font:12px monospace;padding:2px 6px;white-space:nowrap";

/// Whether `node` is the overlay container or lives inside it
pub fn is_highlight_node<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if dom.attribute(id, "id") == Some(CONTAINER_ID) {
            return true;
        }
        current = dom.parent(id);
    }
    false
}

/// Stateful overlay manager bound to one document
#[derive(Debug, Default)]
pub struct Highlighter {
    container: Option<NodeId>,
    overlays: BTreeMap<NodeId, OverlayElement>,
}

impl Highlighter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    pub fn is_highlighted(&self, element: NodeId) -> bool {
        self.overlays.contains_key(&element)
    }

    pub fn highlighted_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn overlay(&self, element: NodeId) -> Option<&OverlayElement> {
        self.overlays.get(&element)
    }

    fn ensure_container(&mut self, doc: &mut Document) -> Result<NodeId> {
        if let Some(container) = self.container.filter(|c| doc.is_connected(*c)) {
            return Ok(container);
        }

        let container = doc.create_element("div");
        doc.set_attribute(container, "id", CONTAINER_ID)?;
        doc.set_attribute(
            container,
            "style",
            &format!(
                "position:absolute;top:0;left:0;width:0;height:0;pointer-events:none;z-index:{}",
                OVERLAY_Z_INDEX
            ),
        )?;
        let host = doc
            .body()
            .or_else(|| doc.document_element())
            .unwrap_or_else(|| doc.root());
        doc.append_child(host, container)?;
        self.container = Some(container);
        Ok(container)
    }

    /// Document-space rect of `element`: viewport rect plus scroll offsets
    fn document_rect(doc: &Document, element: NodeId) -> Rect {
        let (scroll_x, scroll_y) = doc.scroll_offset();
        doc.rect(element).translate(scroll_x, scroll_y)
    }

    /// Draw an overlay over `element`, replacing any existing one
    pub fn highlight(
        &mut self,
        doc: &mut Document,
        element: NodeId,
        options: HighlightOptions,
    ) -> Result<&OverlayElement> {
        if doc.element(element).is_none() {
            return Err(Error::NotAnElement(element.0));
        }
        self.clear_highlight(doc, element)?;
        let container = self.ensure_container(doc)?;

        let overlay = doc.create_element("div");
        doc.set_attribute(overlay, "class", OVERLAY_CLASS)?;
        doc.set_attribute(overlay, "data-target", &element.0.to_string())?;
        doc.set_attribute(
            overlay,
            "style",
            &overlay_style(Self::document_rect(doc, element), &options),
        )?;

        let tooltip = match &options.tooltip {
            Some(text) => {
                let tooltip = doc.create_element("div");
                doc.set_attribute(tooltip, "class", TOOLTIP_CLASS)?;
                doc.set_attribute(tooltip, "style", TOOLTIP_STYLE)?;
                doc.set_text_content(tooltip, text)?;
                doc.append_child(overlay, tooltip)?;
                Some(tooltip)
            }
            None => None,
        };
        doc.append_child(container, overlay)?;
        debug!("Highlighted element {}", element);

        let entry = self.overlays.entry(element).or_insert(OverlayElement {
            element,
            overlay,
            tooltip,
            options,
        });
        Ok(entry)
    }

    /// Remove the overlay for `element`. Returns whether one existed.
    pub fn clear_highlight(&mut self, doc: &mut Document, element: NodeId) -> Result<bool> {
        match self.overlays.remove(&element) {
            Some(entry) => {
                doc.remove(entry.overlay)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear_all(&mut self, doc: &mut Document) -> Result<()> {
        for (_, entry) in std::mem::take(&mut self.overlays) {
            doc.remove(entry.overlay)?;
        }
        Ok(())
    }

    /// Re-position every overlay after layout or scroll changes
    pub fn update_positions(&self, doc: &mut Document) -> Result<()> {
        for entry in self.overlays.values() {
            let style = overlay_style(Self::document_rect(doc, entry.element), &entry.options);
            doc.set_attribute(entry.overlay, "style", &style)?;
        }
        Ok(())
    }

    /// Remove every overlay and the container itself
    pub fn destroy(&mut self, doc: &mut Document) -> Result<()> {
        self.clear_all(doc)?;
        if let Some(container) = self.container.take() {
            doc.remove(container)?;
        }
        Ok(())
    }
}
