//! CSS selector parsing and matching
//!
//! Parsing and matching run on the `selectors` crate, the engine scraper is
//! built on. [`NodeRef`] adapts a node of any [`ElementQuery`] tree to
//! `selectors::Element`, so the full Selectors Level 4 grammar that crate
//! implements (`:has`, `:is`, `:where`, `:nth-child(An+B of S)`, ...) works
//! on the arena document. On top of the tree-structural pseudo-classes the
//! form-state ones accessibility rules need are supported: `:checked`,
//! `:disabled`, `:enabled`, `:link` and `:any-link`.

use std::fmt;

use cssparser::{CowRcStr, ParseError, ParserInput, SourceLocation, ToCss};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{
    self, ElementSelectorFlags, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode,
    NeedsSelectorFlags, QuirksMode,
};
use selectors::parser::{self, ParseRelative, SelectorParseErrorKind};
use selectors::{Element, NthIndexCache, OpaqueElement};

use crate::dom::{NodeId, NodeKind};
use crate::error::{Error, Result};
use crate::query::ElementQuery;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A parsed comma-separated selector group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    source: String,
    selectors: parser::SelectorList<PageSelectors>,
}

impl SelectorList {
    pub fn parse(selector: &str) -> Result<Self> {
        let mut input = ParserInput::new(selector);
        let mut css = cssparser::Parser::new(&mut input);
        let selectors = parser::SelectorList::parse(&SelectorParser, &mut css, ParseRelative::No)
            .map_err(|e| unsupported(selector, &e))?;
        css.expect_exhausted()
            .map_err(|e| unsupported(selector, &e))?;
        Ok(Self {
            source: selector.to_string(),
            selectors,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches<D: ElementQuery + ?Sized>(&self, dom: &D, node: NodeId) -> bool {
        let Some(element) = NodeRef::new(dom, node) else {
            return false;
        };
        let mut nth_cache = NthIndexCache::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut nth_cache,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            IgnoreNthChildForInvalidation::No,
        );
        self.selectors
            .0
            .iter()
            .any(|selector| matching::matches_selector(selector, 0, None, &element, &mut context))
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn unsupported(selector: &str, error: &impl fmt::Debug) -> Error {
    Error::UnsupportedSelector(format!("{} ({:?})", selector, error))
}

/// Selector implementation for the arena document: plain string atoms, the
/// form-state pseudo-classes and no pseudo-elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSelectors;

impl parser::SelectorImpl for PageSelectors {
    type ExtraMatchingData<'a> = ();
    type AttrValue = CssString;
    type Identifier = CssIdent;
    type LocalName = CssIdent;
    type NamespaceUrl = CssIdent;
    type NamespacePrefix = CssIdent;
    type BorrowedNamespaceUrl = CssIdent;
    type BorrowedLocalName = CssIdent;
    type NonTSPseudoClass = PseudoClass;
    type PseudoElement = PseudoElement;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssIdent(String);

impl From<&str> for CssIdent {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl ToCss for CssIdent {
    fn to_css<W>(&self, dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        cssparser::serialize_identifier(&self.0, dest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssString(String);

impl From<&str> for CssString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for CssString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssString {
    fn to_css<W>(&self, dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        cssparser::serialize_string(&self.0, dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoClass {
    Checked,
    Disabled,
    Enabled,
    Link,
    AnyLink,
}

impl parser::NonTSPseudoClass for PseudoClass {
    type Impl = PageSelectors;

    fn is_active_or_hover(&self) -> bool {
        false
    }

    fn is_user_action_state(&self) -> bool {
        false
    }
}

impl ToCss for PseudoClass {
    fn to_css<W>(&self, dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        dest.write_str(match self {
            PseudoClass::Checked => ":checked",
            PseudoClass::Disabled => ":disabled",
            PseudoClass::Enabled => ":enabled",
            PseudoClass::Link => ":link",
            PseudoClass::AnyLink => ":any-link",
        })
    }
}

/// Pseudo-elements never match document nodes, so none parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoElement {}

impl parser::PseudoElement for PseudoElement {
    type Impl = PageSelectors;
}

impl ToCss for PseudoElement {
    fn to_css<W>(&self, _dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        match *self {}
    }
}

struct SelectorParser;

impl<'i> parser::Parser<'i> for SelectorParser {
    type Impl = PageSelectors;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_is_and_where(&self) -> bool {
        true
    }

    fn parse_has(&self) -> bool {
        true
    }

    fn parse_nth_child_of(&self) -> bool {
        true
    }

    fn parse_non_ts_pseudo_class(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> std::result::Result<PseudoClass, ParseError<'i, Self::Error>> {
        let pseudo = match name.to_ascii_lowercase().as_str() {
            "checked" => PseudoClass::Checked,
            "disabled" => PseudoClass::Disabled,
            "enabled" => PseudoClass::Enabled,
            "link" => PseudoClass::Link,
            "any-link" => PseudoClass::AnyLink,
            _ => {
                return Err(location.new_custom_error(
                    SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name),
                ))
            }
        };
        Ok(pseudo)
    }
}

/// An element of an [`ElementQuery`] tree as seen by the matcher
pub struct NodeRef<'a, D: ?Sized> {
    dom: &'a D,
    node: NodeId,
    // Arena slot of the node; its address identifies the element in the
    // matcher's caches
    kind: &'a NodeKind,
}

impl<'a, D: ElementQuery + ?Sized> NodeRef<'a, D> {
    /// `None` unless `node` is an element
    pub fn new(dom: &'a D, node: NodeId) -> Option<Self> {
        match dom.node_kind(node)? {
            kind @ NodeKind::Element(_) => Some(Self { dom, node, kind }),
            _ => None,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn tag(&self) -> &'a str {
        self.dom.tag_name(self.node).unwrap_or_default()
    }

    fn siblings(&self) -> (&'a [NodeId], usize) {
        let siblings: &'a [NodeId] = match self.dom.parent(self.node) {
            Some(parent) => self.dom.children(parent),
            None => &[],
        };
        let position = siblings
            .iter()
            .position(|sibling| *sibling == self.node)
            .unwrap_or(siblings.len());
        (siblings, position)
    }

    fn wrap_first<'n>(&self, mut nodes: impl Iterator<Item = &'n NodeId>) -> Option<Self> {
        nodes.find_map(|node| NodeRef::new(self.dom, *node))
    }
}

impl<D: ?Sized> Clone for NodeRef<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: ?Sized> Copy for NodeRef<'_, D> {}

impl<D: ?Sized> fmt::Debug for NodeRef<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.node).finish()
    }
}

impl<D: ElementQuery + ?Sized> Element for NodeRef<'_, D> {
    type Impl = PageSelectors;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.kind)
    }

    fn parent_element(&self) -> Option<Self> {
        self.dom
            .parent_element(self.node)
            .and_then(|parent| NodeRef::new(self.dom, parent))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        let (siblings, position) = self.siblings();
        self.wrap_first(siblings[..position].iter().rev())
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let (siblings, position) = self.siblings();
        self.wrap_first(siblings.iter().skip(position + 1))
    }

    fn first_element_child(&self) -> Option<Self> {
        self.wrap_first(self.dom.children(self.node).iter())
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, local_name: &CssIdent) -> bool {
        self.tag() == local_name.0
    }

    fn has_namespace(&self, ns: &CssIdent) -> bool {
        ns.0.is_empty() || ns.0 == HTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.tag() == other.tag()
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&CssIdent>,
        local_name: &CssIdent,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        if let NamespaceConstraint::Specific(url) = ns {
            if !url.0.is_empty() {
                return false;
            }
        }
        self.dom
            .attribute(self.node, &local_name.0)
            .is_some_and(|value| operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &PseudoClass,
        _context: &mut MatchingContext<Self::Impl>,
    ) -> bool {
        let has = |name| self.dom.has_attribute(self.node, name);
        match pc {
            PseudoClass::Checked => has("checked") || has("selected"),
            PseudoClass::Disabled => has("disabled"),
            PseudoClass::Enabled => !has("disabled"),
            PseudoClass::Link | PseudoClass::AnyLink => self.is_link(),
        }
    }

    fn match_pseudo_element(
        &self,
        pe: &PseudoElement,
        _context: &mut MatchingContext<Self::Impl>,
    ) -> bool {
        match *pe {}
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        matches!(self.tag(), "a" | "area" | "link") && self.dom.has_attribute(self.node, "href")
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn has_id(&self, id: &CssIdent, case_sensitivity: CaseSensitivity) -> bool {
        self.dom
            .attribute(self.node, "id")
            .is_some_and(|value| case_sensitivity.eq(id.0.as_bytes(), value.as_bytes()))
    }

    fn has_class(&self, name: &CssIdent, case_sensitivity: CaseSensitivity) -> bool {
        self.dom.attribute(self.node, "class").is_some_and(|classes| {
            classes
                .split_ascii_whitespace()
                .any(|class| case_sensitivity.eq(name.0.as_bytes(), class.as_bytes()))
        })
    }

    fn imported_part(&self, _name: &CssIdent) -> Option<CssIdent> {
        None
    }

    fn is_part(&self, _name: &CssIdent) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        !self.dom.children(self.node).iter().any(|child| {
            self.dom.is_element(*child) || self.dom.text(*child).is_some_and(|text| !text.is_empty())
        })
    }

    fn is_root(&self) -> bool {
        self.dom
            .parent(self.node)
            .is_some_and(|parent| matches!(self.dom.node_kind(parent), Some(NodeKind::Document)))
    }
}
