//! HTML adapter: builds a [`Document`] from markup and writes it back.
//!
//! Parsing goes through `scraper` (html5ever), so malformed markup is
//! recovered the same way a browser would. Visual properties are resolved
//! with a small cascade: tag defaults, the `hidden` attribute, inline `style`
//! declarations, and inheritance of color, visibility and font size.

use scraper::{ElementRef, Html, Node};

use crate::dom::{Display, Document, NodeId, NodeKind, VisualStyle};
use crate::error::Result;

/// Elements that never have children or a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is written without escaping.
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Parse a full HTML document. The `<html>` element becomes the only child of
/// the synthetic root.
pub fn parse_html(markup: &str) -> Result<Document> {
    let parsed = Html::parse_document(markup);
    let mut doc = Document::new();
    let root = doc.root();
    import_element(&mut doc, root, parsed.root_element())?;
    Ok(doc)
}

/// Parse a fragment; its top-level nodes become children of the synthetic root.
pub fn parse_fragment(markup: &str) -> Result<Document> {
    let parsed = Html::parse_fragment(markup);
    let mut doc = Document::new();
    let root = doc.root();
    // html5ever wraps fragments in a synthetic <html> element.
    import_children(&mut doc, root, parsed.root_element())?;
    Ok(doc)
}

fn import_element(doc: &mut Document, parent: NodeId, el: ElementRef<'_>) -> Result<()> {
    let value = el.value();
    let id = doc.create_element(value.name());
    for (name, attr_value) in value.attrs() {
        doc.set_attr(id, name, attr_value)?;
    }

    let parent_style = doc.style(parent).ok().cloned();
    let tag = doc.tag(id)?.to_string();
    let mut style = VisualStyle::inherited(&tag, parent_style.as_ref());
    if doc.has_attr(id, "hidden") {
        style.display = Display::None;
    }
    if let Some(declarations) = doc.attr(id, "style") {
        let parent_font = parent_style
            .as_ref()
            .map(|s| s.font_size)
            .unwrap_or(crate::dom::DEFAULT_FONT_SIZE_PX);
        style.apply_declarations(declarations, parent_font);
    }
    *doc.style_mut(id)? = style;

    doc.append_child(parent, id)?;
    import_children(doc, id, el)
}

fn import_children(doc: &mut Document, parent: NodeId, el: ElementRef<'_>) -> Result<()> {
    for child in el.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    import_element(doc, parent, child_el)?;
                }
            }
            Node::Text(text) => {
                doc.append_text(parent, &text[..])?;
            }
            Node::Comment(comment) => {
                let id = doc.create_comment(&comment[..]);
                doc.append_child(parent, id)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Serialize the whole document. The synthetic root itself is not written.
pub fn to_html(doc: &Document) -> String {
    let mut out = String::new();
    if doc.find_element("html").is_some() {
        out.push_str("<!DOCTYPE html>");
    }
    if let Ok(children) = doc.children(doc.root()) {
        for child in children {
            write_node(doc, *child, false, &mut out);
        }
    }
    out
}

/// Serialize one node and its subtree.
pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, false, &mut out);
    out
}

fn write_node(doc: &Document, id: NodeId, raw_text: bool, out: &mut String) {
    match doc.kind(id) {
        Ok(NodeKind::Text) => {
            if let Ok(text) = doc.text(id) {
                if raw_text {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text));
                }
            }
        }
        Ok(NodeKind::Comment) => {
            if let Ok(body) = doc.comment(id) {
                out.push_str("<!--");
                out.push_str(body);
                out.push_str("-->");
            }
        }
        Ok(NodeKind::Element) => {
            let Ok(tag) = doc.tag(id) else {
                return;
            };
            out.push('<');
            out.push_str(tag);
            if let Ok(attrs) = doc.attrs(id) {
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_TAGS.contains(&tag) {
                return;
            }
            let raw = RAW_TEXT_TAGS.contains(&tag);
            if let Ok(children) = doc.children(id) {
                for child in children {
                    write_node(doc, *child, raw, out);
                }
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Err(e) => tracing::debug!("Skipping unreadable node during serialization: {}", e),
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
