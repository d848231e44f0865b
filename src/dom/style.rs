//! Resolved visual properties for element nodes.
//!
//! These mirror what a host would report as computed style. The HTML adapter
//! resolves them from tag defaults, the `hidden` attribute, inline `style`
//! declarations and inheritance from the parent.

use std::str::FromStr;

use serde::Serialize;

/// Font size used when nothing else applies.
pub const DEFAULT_FONT_SIZE_PX: f32 = 16.0;

/// Tags rendered as `display: block` by default.
const BLOCK_TAGS: &[&str] = &[
    "#root", "address", "article", "aside", "blockquote", "body", "center", "dd", "details",
    "dialog", "dir", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hgroup", "hr", "html", "legend", "main", "menu",
    "nav", "ol", "p", "pre", "section", "summary", "ul",
];

/// Tags never rendered.
const HIDDEN_TAGS: &[&str] = &[
    "base", "head", "link", "meta", "noscript", "script", "style", "template", "title",
];

/// Table parts that behave as blocks for reading order.
const TABLE_PART_TAGS: &[&str] = &[
    "caption", "col", "colgroup", "tbody", "td", "tfoot", "th", "thead", "tr",
];

/// CSS `display`, reduced to the values that matter for reading order and
/// hiding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Display {
    #[default]
    Inline,
    InlineBlock,
    Block,
    Flex,
    Grid,
    Table,
    /// `table-row`, `table-cell` and the other `table-*` values.
    TablePart,
    ListItem,
    Contents,
    None,
}

impl Display {
    /// Whether a container with this display ends a line of reading order.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Display::Block
                | Display::Flex
                | Display::Grid
                | Display::Table
                | Display::TablePart
                | Display::ListItem
        )
    }

    /// Default display for an element kind.
    pub fn for_tag(tag: &str) -> Self {
        if BLOCK_TAGS.contains(&tag) {
            Display::Block
        } else if HIDDEN_TAGS.contains(&tag) {
            Display::None
        } else if TABLE_PART_TAGS.contains(&tag) {
            Display::TablePart
        } else if tag == "li" {
            Display::ListItem
        } else if tag == "table" {
            Display::Table
        } else {
            Display::Inline
        }
    }
}

impl FromStr for Display {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        match value.as_str() {
            "inline" => Ok(Display::Inline),
            "inline-block" | "inline-flex" | "inline-grid" | "inline-table" => {
                Ok(Display::InlineBlock)
            }
            "block" | "flow-root" => Ok(Display::Block),
            "flex" => Ok(Display::Flex),
            "grid" => Ok(Display::Grid),
            "table" => Ok(Display::Table),
            "list-item" => Ok(Display::ListItem),
            "contents" => Ok(Display::Contents),
            "none" => Ok(Display::None),
            v if v.starts_with("table-") => Ok(Display::TablePart),
            _ => Err(format!("unsupported display value '{}'", s)),
        }
    }
}

/// CSS `visibility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    Collapse,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visible" => Ok(Visibility::Visible),
            "hidden" => Ok(Visibility::Hidden),
            "collapse" => Ok(Visibility::Collapse),
            _ => Err(format!("unsupported visibility value '{}'", s)),
        }
    }
}

/// CSS `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

impl Position {
    /// Whether the element is taken out of normal flow and placed by offsets.
    pub fn is_out_of_flow(&self) -> bool {
        matches!(self, Position::Absolute | Position::Fixed)
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Position::Static),
            "relative" => Ok(Position::Relative),
            "absolute" => Ok(Position::Absolute),
            "fixed" => Ok(Position::Fixed),
            "sticky" => Ok(Position::Sticky),
            _ => Err(format!("unsupported position value '{}'", s)),
        }
    }
}

/// An sRGB color with 8-bit alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    fn named(name: &str) -> Option<Self> {
        let color = match name {
            "black" => Color::BLACK,
            "white" => Color::rgb(255, 255, 255),
            "red" => Color::rgb(255, 0, 0),
            "green" => Color::rgb(0, 128, 0),
            "lime" => Color::rgb(0, 255, 0),
            "blue" => Color::rgb(0, 0, 255),
            "yellow" => Color::rgb(255, 255, 0),
            "gray" | "grey" => Color::rgb(128, 128, 128),
            "silver" => Color::rgb(192, 192, 192),
            "whitesmoke" => Color::rgb(245, 245, 245),
            "transparent" => Color::TRANSPARENT,
            _ => return None,
        };
        Some(color)
    }

    fn from_hex(hex: &str) -> Option<Self> {
        let digits: Vec<u8> = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<_>>>()?;
        match digits.len() {
            3 | 4 => {
                let expand = |d: u8| d * 16 + d;
                Some(Color {
                    r: expand(digits[0]),
                    g: expand(digits[1]),
                    b: expand(digits[2]),
                    a: digits.get(3).map(|d| expand(*d)).unwrap_or(255),
                })
            }
            6 | 8 => {
                let pair = |i: usize| digits[i] * 16 + digits[i + 1];
                Some(Color {
                    r: pair(0),
                    g: pair(2),
                    b: pair(4),
                    a: if digits.len() == 8 { pair(6) } else { 255 },
                })
            }
            _ => None,
        }
    }

    fn from_function(args: &str) -> Option<Self> {
        let parts: Vec<&str> = args
            .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = |p: &str| -> Option<u8> {
            let value = match p.strip_suffix('%') {
                Some(pct) => pct.parse::<f32>().ok()? * 2.55,
                None => p.parse::<f32>().ok()?,
            };
            Some(value.round().clamp(0.0, 255.0) as u8)
        };
        let alpha = match parts.get(3) {
            Some(p) => {
                let value = match p.strip_suffix('%') {
                    Some(pct) => pct.parse::<f32>().ok()? / 100.0,
                    None => p.parse::<f32>().ok()?,
                };
                (value.clamp(0.0, 1.0) * 255.0).round() as u8
            }
            None => 255,
        };
        Some(Color {
            r: channel(parts[0])?,
            g: channel(parts[1])?,
            b: channel(parts[2])?,
            a: alpha,
        })
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        let parsed = if let Some(hex) = value.strip_prefix('#') {
            Color::from_hex(hex)
        } else if let Some(args) = value
            .strip_prefix("rgba(")
            .or_else(|| value.strip_prefix("rgb("))
        {
            args.strip_suffix(')').and_then(Color::from_function)
        } else {
            Color::named(&value)
        };
        parsed.ok_or_else(|| format!("unsupported color '{}'", s))
    }
}

/// Parse a CSS length to pixels. `percent_base` resolves `%` and `em`.
pub fn parse_length(value: &str, percent_base: f32) -> Option<f32> {
    let value = value.trim().to_ascii_lowercase();
    let (number, scale) = if let Some(n) = value.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("pt") {
        (n, 4.0 / 3.0)
    } else if let Some(n) = value.strip_suffix("rem") {
        (n, DEFAULT_FONT_SIZE_PX)
    } else if let Some(n) = value.strip_suffix("em") {
        (n, percent_base)
    } else if let Some(n) = value.strip_suffix('%') {
        (n, percent_base / 100.0)
    } else {
        (value.as_str(), 1.0)
    };
    number.trim().parse::<f32>().ok().map(|n| n * scale)
}

/// Host-computed visual properties of one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualStyle {
    pub display: Display,
    pub visibility: Visibility,
    pub opacity: f32,
    /// Font size in pixels.
    pub font_size: f32,
    pub color: Color,
    pub background_color: Color,
    pub position: Position,
    /// Left offset in pixels, when set.
    pub left: Option<f32>,
    /// Top offset in pixels, when set.
    pub top: Option<f32>,
}

impl Default for VisualStyle {
    fn default() -> Self {
        Self {
            display: Display::Inline,
            visibility: Visibility::Visible,
            opacity: 1.0,
            font_size: DEFAULT_FONT_SIZE_PX,
            color: Color::BLACK,
            background_color: Color::TRANSPARENT,
            position: Position::Static,
            left: None,
            top: None,
        }
    }
}

impl VisualStyle {
    /// Style of a freshly created element of the given kind.
    pub fn for_tag(tag: &str) -> Self {
        Self {
            display: Display::for_tag(tag),
            ..Self::default()
        }
    }

    /// Start from the tag defaults and take inherited properties from `parent`.
    pub fn inherited(tag: &str, parent: Option<&VisualStyle>) -> Self {
        let mut style = Self::for_tag(tag);
        if let Some(parent) = parent {
            style.color = parent.color;
            style.visibility = parent.visibility;
            style.font_size = parent.font_size;
        }
        style
    }

    /// Apply a `style` attribute body. Unknown properties and values are ignored.
    pub fn apply_declarations(&mut self, declarations: &str, parent_font_size: f32) {
        for declaration in declarations.split(';') {
            let Some((property, value)) = declaration.split_once(':') else {
                continue;
            };
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            let value = value
                .strip_suffix("!important")
                .map(str::trim_end)
                .unwrap_or(value);

            match property.as_str() {
                "display" => {
                    if let Ok(display) = value.parse() {
                        self.display = display;
                    }
                }
                "visibility" => {
                    if let Ok(visibility) = value.parse() {
                        self.visibility = visibility;
                    }
                }
                "opacity" => {
                    let parsed = match value.strip_suffix('%') {
                        Some(pct) => pct.trim().parse::<f32>().ok().map(|p| p / 100.0),
                        None => value.parse::<f32>().ok(),
                    };
                    if let Some(opacity) = parsed {
                        self.opacity = opacity.clamp(0.0, 1.0);
                    }
                }
                "font-size" => {
                    if let Some(size) = parse_length(value, parent_font_size) {
                        self.font_size = size.max(0.0);
                    }
                }
                "color" => {
                    if let Ok(color) = value.parse() {
                        self.color = color;
                    }
                }
                "background-color" => {
                    if let Ok(color) = value.parse() {
                        self.background_color = color;
                    }
                }
                "background" => {
                    if let Some(color) = value
                        .split_whitespace()
                        .find_map(|token| token.parse::<Color>().ok())
                    {
                        self.background_color = color;
                    }
                }
                "position" => {
                    if let Ok(position) = value.parse() {
                        self.position = position;
                    }
                }
                "left" => self.left = parse_length(value, 0.0),
                "top" => self.top = parse_length(value, 0.0),
                _ => {}
            }
        }
    }

    /// Force the element to render as a visible warning block.
    pub fn reveal(&mut self) {
        self.display = Display::Block;
        self.visibility = Visibility::Visible;
        self.opacity = 1.0;
        self.font_size = 12.0;
        self.color = Color::rgb(255, 0, 0);
        self.background_color = Color::rgb(0xff, 0xe6, 0xe6);
        self.position = Position::Static;
        self.left = None;
        self.top = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_block_detection() {
        assert!(Display::Block.is_block());
        assert!(Display::TablePart.is_block());
        assert!(!Display::Inline.is_block());
        assert!(!Display::None.is_block());
        assert_eq!("table-row".parse::<Display>(), Ok(Display::TablePart));
        assert_eq!(Display::for_tag("li"), Display::ListItem);
        assert_eq!(Display::for_tag("span"), Display::Inline);
        assert_eq!(Display::for_tag("script"), Display::None);
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!("#fff".parse::<Color>(), Ok(Color::rgb(255, 255, 255)));
        assert_eq!("#FFFFFF".parse::<Color>(), Ok(Color::rgb(255, 255, 255)));
        assert_eq!("white".parse::<Color>(), Ok(Color::rgb(255, 255, 255)));
        assert_eq!(
            "rgb(255, 255, 255)".parse::<Color>(),
            Ok(Color::rgb(255, 255, 255))
        );
        assert!("rgba(0, 0, 0, 0)".parse::<Color>().unwrap().is_transparent());
        assert!("not-a-color".parse::<Color>().is_err());
    }

    #[test]
    fn test_length_parsing() {
        assert_eq!(parse_length("0.5px", 16.0), Some(0.5));
        assert_eq!(parse_length("-9999px", 0.0), Some(-9999.0));
        let pt = parse_length("12pt", 16.0).unwrap();
        assert!((pt - 16.0).abs() < 1e-4);
        let em = parse_length("0.01em", 16.0).unwrap();
        assert!((em - 0.16).abs() < 1e-4);
        assert_eq!(parse_length("auto", 16.0), None);
    }

    #[test]
    fn test_apply_declarations() {
        let mut style = VisualStyle::for_tag("div");
        style.apply_declarations(
            "display: none; opacity: 0.01; font-size: 0.5px; color: #fff; background: white; position: absolute; left: -5000px !important",
            16.0,
        );
        assert_eq!(style.display, Display::None);
        assert!(style.opacity < 0.05);
        assert_eq!(style.font_size, 0.5);
        assert_eq!(style.color, style.background_color);
        assert_eq!(style.position, Position::Absolute);
        assert_eq!(style.left, Some(-5000.0));
        assert_eq!(style.top, None);
    }

    #[test]
    fn test_inheritance_and_reveal() {
        let mut parent = VisualStyle::for_tag("div");
        parent.apply_declarations("color: white; visibility: hidden", 16.0);
        let mut child = VisualStyle::inherited("span", Some(&parent));
        assert_eq!(child.color, Color::rgb(255, 255, 255));
        assert_eq!(child.visibility, Visibility::Hidden);
        assert!(child.background_color.is_transparent());

        child.reveal();
        assert_eq!(child.display, Display::Block);
        assert_eq!(child.visibility, Visibility::Visible);
        assert_eq!(child.opacity, 1.0);
    }
}
