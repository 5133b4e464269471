//! Colors, inline styles and WCAG contrast

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::query::ElementQuery;

/// sRGB color with straight alpha
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);
    pub const TRANSPARENT: Rgba = Rgba { r: 0, g: 0, b: 0, a: 0.0 };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse a CSS color: hex, `rgb()`/`rgba()`, `transparent` or a
    /// common named color
    pub fn parse(input: &str) -> Result<Self> {
        let value = input.trim().to_ascii_lowercase();
        let invalid = || Error::InvalidColor(input.to_string());

        if let Some(hex) = value.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(invalid);
        }
        if let Some(args) = value
            .strip_prefix("rgba(")
            .or_else(|| value.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_rgb_args(args).ok_or_else(invalid);
        }
        named_color(&value).ok_or_else(invalid)
    }

    /// Composite `self` over an opaque `background`
    pub fn over(self, background: Rgba) -> Rgba {
        let a = self.a.clamp(0.0, 1.0);
        let mix = |fg: u8, bg: u8| (fg as f64 * a + bg as f64 * (1.0 - a)).round() as u8;
        Rgba::opaque(
            mix(self.r, background.r),
            mix(self.g, background.g),
            mix(self.b, background.b),
        )
    }

    /// WCAG relative luminance
    pub fn relative_luminance(&self) -> f64 {
        let channel = |c: u8| {
            let c = c as f64 / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        0.2126 * channel(self.r) + 0.7152 * channel(self.g) + 0.0722 * channel(self.b)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a >= 1.0 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 | 4 => {
            let a = if hex.len() == 4 { nibble(3)? as f64 / 255.0 } else { 1.0 };
            Some(Rgba { r: nibble(0)?, g: nibble(1)?, b: nibble(2)?, a })
        }
        6 | 8 => {
            let a = if hex.len() == 8 { byte(6)? as f64 / 255.0 } else { 1.0 };
            Some(Rgba { r: byte(0)?, g: byte(2)?, b: byte(4)?, a })
        }
        _ => None,
    }
}

fn parse_rgb_args(args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |raw: &str| -> Option<u8> {
        match raw.strip_suffix('%') {
            Some(pct) => Some((pct.parse::<f64>().ok()?.clamp(0.0, 100.0) * 2.55).round() as u8),
            None => Some(raw.parse::<f64>().ok()?.clamp(0.0, 255.0).round() as u8),
        }
    };
    let alpha = match parts.get(3) {
        Some(raw) => match raw.strip_suffix('%') {
            Some(pct) => pct.parse::<f64>().ok()? / 100.0,
            None => raw.parse::<f64>().ok()?,
        },
        None => 1.0,
    };
    Some(Rgba {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
        a: alpha.clamp(0.0, 1.0),
    })
}

fn named_color(name: &str) -> Option<Rgba> {
    let color = match name {
        "transparent" => Rgba::TRANSPARENT,
        "black" => Rgba::BLACK,
        "white" => Rgba::WHITE,
        "red" => Rgba::opaque(255, 0, 0),
        "green" => Rgba::opaque(0, 128, 0),
        "blue" => Rgba::opaque(0, 0, 255),
        "yellow" => Rgba::opaque(255, 255, 0),
        "orange" => Rgba::opaque(255, 165, 0),
        "purple" => Rgba::opaque(128, 0, 128),
        "gray" | "grey" => Rgba::opaque(128, 128, 128),
        "silver" => Rgba::opaque(192, 192, 192),
        "lightgray" | "lightgrey" => Rgba::opaque(211, 211, 211),
        "darkgray" | "darkgrey" => Rgba::opaque(169, 169, 169),
        "navy" => Rgba::opaque(0, 0, 128),
        "maroon" => Rgba::opaque(128, 0, 0),
        "teal" => Rgba::opaque(0, 128, 128),
        _ => return None,
    };
    Some(color)
}

/// Parse a `style` attribute into lowercase property names and trimmed,
/// lowercase values. Later declarations win.
pub fn parse_inline_style(style: &str) -> HashMap<String, String> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_end_matches("!important").trim().to_ascii_lowercase();
            if name.is_empty() || value.is_empty() {
                None
            } else {
                Some((name, value))
            }
        })
        .collect()
}

fn style_property<D: ElementQuery + ?Sized>(dom: &D, node: NodeId, property: &str) -> Option<String> {
    dom.attribute(node, "style")
        .and_then(|style| parse_inline_style(style).remove(property))
}

/// Nearest declared value walking from `node` up through its ancestors
fn inherited_property<D: ElementQuery + ?Sized>(
    dom: &D,
    node: NodeId,
    property: &str,
) -> Option<String> {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if let Some(value) = style_property(dom, current, property) {
            return Some(value);
        }
        cursor = dom.parent_element(current);
    }
    None
}

/// Text color of `node` (inherited, default black)
pub fn foreground_color<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Rgba {
    inherited_property(dom, node, "color")
        .and_then(|value| Rgba::parse(&value).ok())
        .unwrap_or(Rgba::BLACK)
}

/// Effective opaque background behind `node`: translucent layers are
/// composited down to the first opaque one, or onto white
pub fn background_color<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> Rgba {
    let mut layers = Vec::new();
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        let declared = style_property(dom, current, "background-color")
            .or_else(|| style_property(dom, current, "background"));
        if let Some(color) = declared.and_then(|value| Rgba::parse(&value).ok()) {
            if color.a > 0.0 {
                layers.push(color);
                if color.a >= 1.0 {
                    break;
                }
            }
        }
        cursor = dom.parent_element(current);
    }

    layers
        .into_iter()
        .rev()
        .fold(Rgba::WHITE, |below, layer| layer.over(below))
}

/// Contrast ratio between two colors, from 1.0 to 21.0
pub fn contrast_ratio(a: Rgba, b: Rgba) -> f64 {
    let la = a.relative_luminance();
    let lb = b.relative_luminance();
    let (lighter, darker) = if la > lb { (la, lb) } else { (lb, la) };
    (lighter + 0.05) / (darker + 0.05)
}

/// WCAG conformance level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WcagLevel {
    #[default]
    AA,
    AAA,
}

impl WcagLevel {
    pub fn required_ratio(&self, large_text: bool) -> f64 {
        match (self, large_text) {
            (WcagLevel::AA, false) => 4.5,
            (WcagLevel::AA, true) => 3.0,
            (WcagLevel::AAA, false) => 7.0,
            (WcagLevel::AAA, true) => 4.5,
        }
    }
}

/// Contrast assessment of one element's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastResult {
    pub ratio: f64,
    pub foreground: Rgba,
    pub background: Rgba,
    pub large_text: bool,
    pub passes_aa: bool,
    pub passes_aaa: bool,
}

impl ContrastResult {
    pub fn passes(&self, level: WcagLevel) -> bool {
        match level {
            WcagLevel::AA => self.passes_aa,
            WcagLevel::AAA => self.passes_aaa,
        }
    }
}

fn font_size_px<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> f64 {
    inherited_property(dom, node, "font-size")
        .and_then(|value| {
            if let Some(px) = value.strip_suffix("px") {
                px.trim().parse::<f64>().ok()
            } else if let Some(pt) = value.strip_suffix("pt") {
                pt.trim().parse::<f64>().ok().map(|pt| pt * 4.0 / 3.0)
            } else if let Some(em) = value.strip_suffix("rem").or_else(|| value.strip_suffix("em")) {
                em.trim().parse::<f64>().ok().map(|em| em * 16.0)
            } else {
                None
            }
        })
        .unwrap_or(16.0)
}

fn is_bold<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> bool {
    if matches!(dom.tag_name(node), Some("b" | "strong" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th")) {
        return true;
    }
    inherited_property(dom, node, "font-weight").is_some_and(|weight| {
        weight == "bold" || weight == "bolder" || weight.parse::<u32>().is_ok_and(|w| w >= 700)
    })
}

/// Compute the text contrast of `node` against its effective background
pub fn analyze_contrast<D: ElementQuery + ?Sized>(dom: &D, node: NodeId) -> ContrastResult {
    let background = background_color(dom, node);
    let foreground = foreground_color(dom, node).over(background);
    let ratio = contrast_ratio(foreground, background);

    let size = font_size_px(dom, node);
    // 18pt, or 14pt bold
    let large_text = size >= 24.0 || (size >= 18.66 && is_bold(dom, node));

    ContrastResult {
        ratio,
        foreground,
        background,
        large_text,
        passes_aa: ratio >= WcagLevel::AA.required_ratio(large_text),
        passes_aaa: ratio >= WcagLevel::AAA.required_ratio(large_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use test_case::test_case;

    #[test_case("#fff", Rgba::WHITE)]
    #[test_case("#000000", Rgba::BLACK)]
    #[test_case("rgb(255, 0, 0)", Rgba::opaque(255, 0, 0))]
    #[test_case("rgb(0 128 0)", Rgba::opaque(0, 128, 0))]
    #[test_case("RED", Rgba::opaque(255, 0, 0))]
    fn parses(input: &str, expected: Rgba) {
        assert_eq!(Rgba::parse(input).unwrap(), expected);
    }

    #[test]
    fn parses_alpha() {
        let c = Rgba::parse("rgba(0, 0, 0, 0.5)").unwrap();
        assert_eq!(c.a, 0.5);
        assert!(Rgba::parse("#12").is_err());
        assert!(Rgba::parse("chartreuse-ish").is_err());
    }

    #[test]
    fn black_on_white_is_max_contrast() {
        let ratio = contrast_ratio(Rgba::BLACK, Rgba::WHITE);
        assert!((ratio - 21.0).abs() < 1e-9);
        assert!((contrast_ratio(Rgba::WHITE, Rgba::WHITE) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inline_style_last_wins() {
        let style = parse_inline_style("color: Red; COLOR: blue !important;; margin:0");
        assert_eq!(style.get("color").map(String::as_str), Some("blue"));
        assert_eq!(style.len(), 2);
    }

    #[test]
    fn contrast_uses_ancestor_background() {
        let doc = Document::parse_html(
            r#"<div style="background-color: #000"><p id="low" style="color: #333">x</p>
               <p id="high" style="color: #fff">y</p></div>"#,
        );
        let low = doc.get_element_by_id("low").unwrap();
        let high = doc.get_element_by_id("high").unwrap();
        assert!(!analyze_contrast(&doc, low).passes_aa);
        let result = analyze_contrast(&doc, high);
        assert!(result.passes_aaa);
        assert_eq!(result.background, Rgba::BLACK);
    }

    #[test]
    fn large_text_lowers_threshold() {
        // #767676 on white is about 4.54:1, #949494 about 3.03:1
        let doc = Document::parse_html(
            r#"<p id="small" style="color:#949494">a</p>
               <p id="large" style="color:#949494;font-size:24px">b</p>"#,
        );
        let small = analyze_contrast(&doc, doc.get_element_by_id("small").unwrap());
        let large = analyze_contrast(&doc, doc.get_element_by_id("large").unwrap());
        assert!(!small.passes_aa);
        assert!(large.large_text);
        assert!(large.passes_aa);
    }
}
