//! Heading structure validation
//!
//! Once a heading skips a level (say `h2` → `h4`), the outline is treated
//! as broken from that point on: the offending heading and every later one
//! are reported invalid, even where the later levels are locally
//! consistent.

use serde::{Deserialize, Serialize};

use crate::dom::NodeId;
use crate::query::ElementQuery;

/// Level used for `role="heading"` without a usable `aria-level`
pub const DEFAULT_ARIA_LEVEL: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingInfo {
    pub node: NodeId,
    pub level: u8,
    pub text: String,
    pub valid: bool,
}

/// Summary over a document's headings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingReport {
    pub headings: Vec<HeadingInfo>,
    /// Index of the first heading that broke the structure
    pub first_break: Option<usize>,
}

impl HeadingReport {
    pub fn is_valid(&self) -> bool {
        self.first_break.is_none()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &HeadingInfo> {
        self.headings.iter().filter(|heading| !heading.valid)
    }
}

/// Level of a heading element, `None` if `node` is not a heading
pub fn heading_level<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Option<u8> {
    let tag = dom.tag_name(node)?;
    if dom
        .attribute(node, "role")
        .is_some_and(|role| role.trim().eq_ignore_ascii_case("heading"))
    {
        let level = dom
            .attribute(node, "aria-level")
            .and_then(|level| level.trim().parse::<u8>().ok())
            .filter(|level| *level > 0)
            .unwrap_or(DEFAULT_ARIA_LEVEL);
        return Some(level);
    }

    match tag.as_bytes() {
        [b'h', digit @ b'1'..=b'6'] => Some(digit - b'0'),
        _ => None,
    }
}

/// Assign validity to a sequence of heading levels in one pass
pub fn validate_levels(levels: &[u8]) -> Vec<bool> {
    let mut statuses = Vec::with_capacity(levels.len());
    let mut previous: Option<u8> = None;
    let mut broken = false;

    for &level in levels {
        if let Some(prev) = previous {
            if level > prev.saturating_add(1) {
                broken = true;
            }
        }
        statuses.push(!broken);
        previous = Some(level);
    }
    statuses
}

/// Collect and validate every heading of the document in DOM order
pub fn validate_heading_order<D: ElementQuery + ?Sized>(dom: &D) -> HeadingReport {
    let mut headings: Vec<HeadingInfo> = dom
        .descendant_elements(dom.root())
        .into_iter()
        .filter_map(|node| {
            let level = heading_level(dom, node)?;
            Some(HeadingInfo {
                node,
                level,
                text: dom.text_content(node).split_whitespace().collect::<Vec<_>>().join(" "),
                valid: true,
            })
        })
        .collect();

    let levels: Vec<u8> = headings.iter().map(|h| h.level).collect();
    for (heading, valid) in headings.iter_mut().zip(validate_levels(&levels)) {
        heading.valid = valid;
    }
    let first_break = headings.iter().position(|h| !h.valid);

    HeadingReport {
        headings,
        first_break,
    }
}
