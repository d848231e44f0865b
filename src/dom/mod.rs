//! Document tree collaborator.
//!
//! The host owns the tree; the engine only needs the capability set exposed
//! here: node kind, attributes, text, child order, node creation/insertion and
//! resolved visual properties. Nodes live in an arena and are addressed by
//! copyable [`NodeId`] handles, so a scan can hold handles while mutating.
//!
//! Slots are never reclaimed. A detached node keeps its slot and stays
//! readable through its handle, so the arena only grows as scans replace
//! content. A host that keeps one document alive across many rescans should
//! re-import it (for example `html::parse_html(&html::to_html(&doc))`) once
//! [`Document::len`] runs far ahead of the attached tree, and drop every
//! handle taken from the old document.

pub mod html;
mod style;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use style::{
    Color, DEFAULT_FONT_SIZE_PX, Display, Position, Visibility, VisualStyle, parse_length,
};

use crate::error::{DocumentError, Result};

/// Tag of the synthetic root every document starts with.
pub const ROOT_TAG: &str = "#root";

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    style: VisualStyle,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// An arena-backed document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Create a document holding only the synthetic root container.
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData {
                tag: ROOT_TAG.to_string(),
                attrs: Vec::new(),
                style: VisualStyle::for_tag(ROOT_TAG),
            }),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// The root container.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever created, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document holds only its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn element(&self, id: NodeId) -> Result<&ElementData> {
        match &self.node(id)?.data {
            NodeData::Element(el) => Ok(el),
            _ => Err(DocumentError::NotAnElement(id)),
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(el) => Ok(el),
            _ => Err(DocumentError::NotAnElement(id)),
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    /// Create a detached element with the default style for its tag.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let style = VisualStyle::for_tag(&tag);
        self.push(NodeData::Element(ElementData {
            tag,
            attrs: Vec::new(),
            style,
        }))
    }

    /// Create a detached text leaf.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Create a detached comment.
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Comment(text.into()))
    }

    pub fn kind(&self, id: NodeId) -> Result<NodeKind> {
        Ok(match self.node(id)?.data {
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Comment,
        })
    }

    /// Whether the handle names an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Ok(NodeKind::Element))
    }

    /// Lower-case tag of an element.
    pub fn tag(&self, id: NodeId) -> Result<&str> {
        Ok(&self.element(id)?.tag)
    }

    /// Attribute value, `None` for missing attributes and non-elements.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).ok().and_then(|el| {
            el.attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// All attributes of an element in source order.
    pub fn attrs(&self, id: NodeId) -> Result<&[(String, String)]> {
        Ok(&self.element(id)?.attrs)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let el = self.element_mut(id)?;
        match el.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => *existing = value,
            None => el.attrs.push((name.to_ascii_lowercase(), value)),
        }
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<Option<String>> {
        let el = self.element_mut(id)?;
        let pos = el.attrs.iter().position(|(k, _)| k.eq_ignore_ascii_case(name));
        Ok(pos.map(|i| el.attrs.remove(i).1))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let classes = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", classes)
    }

    /// Value of a text leaf.
    pub fn text(&self, id: NodeId) -> Result<&str> {
        match &self.node(id)?.data {
            NodeData::Text(text) => Ok(text),
            _ => Err(DocumentError::NotText(id)),
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<()> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(existing) => {
                *existing = text.into();
                Ok(())
            }
            _ => Err(DocumentError::NotText(id)),
        }
    }

    /// Body of a comment node.
    pub fn comment(&self, id: NodeId) -> Result<&str> {
        match &self.node(id)?.data {
            NodeData::Comment(text) => Ok(text),
            _ => Err(DocumentError::NotText(id)),
        }
    }

    /// Resolved visual properties of an element.
    pub fn style(&self, id: NodeId) -> Result<&VisualStyle> {
        Ok(&self.element(id)?.style)
    }

    pub fn style_mut(&mut self, id: NodeId) -> Result<&mut VisualStyle> {
        Ok(&mut self.element_mut(id)?.style)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_ok() && self.contains(self.root, id)
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.element(parent)?;
        self.node(child)?;
        if child == self.root || self.contains(child, parent) {
            return Err(DocumentError::Cycle { parent, child });
        }
        Ok(())
    }

    /// Remove the node from its parent. The subtree stays intact but detached.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
            self.node_mut(id)?.parent = None;
        }
        Ok(())
    }

    /// Append `child` as the last child of `parent`, moving it if attached elsewhere.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insertable(parent, child)?;
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Insert `new` directly after `reference` under the same parent.
    pub fn insert_after(&mut self, reference: NodeId, new: NodeId) -> Result<()> {
        let parent = self
            .node(reference)?
            .parent
            .ok_or(DocumentError::Detached(reference))?;
        self.check_insertable(parent, new)?;
        self.detach(new)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let pos = siblings
            .iter()
            .position(|c| *c == reference)
            .ok_or(DocumentError::Detached(reference))?;
        siblings.insert(pos + 1, new);
        self.node_mut(new)?.parent = Some(parent);
        Ok(())
    }

    /// Detach every child of an element.
    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children = std::mem::take(&mut self.node_mut(id)?.children);
        for child in children {
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId> {
        let id = self.create_element(tag);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Create a text leaf and append it to `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> Result<NodeId> {
        let id = self.create_text(text);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Concatenated text of every descendant leaf, comments excluded.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Ok(node) = self.node(current) else {
                continue;
            };
            match &node.data {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element(_) => stack.extend(node.children.iter().rev()),
                NodeData::Comment(_) => {}
            }
        }
        out
    }

    /// Nodes of the subtree at `id` in document order, `id` first.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Ok(node) = self.node(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// First attached element with the given tag, in document order.
    pub fn find_element(&self, tag: &str) -> Option<NodeId> {
        self.preorder(self.root)
            .into_iter()
            .find(|id| self.tag(*id).map(|t| t == tag).unwrap_or(false))
    }

    /// Trimmed text of the first `title` element.
    pub fn title(&self) -> Option<String> {
        let title = self.find_element("title")?;
        let text = self.text_content(title);
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_read_tree() {
        let mut doc = Document::new();
        let div = doc.append_element(doc.root(), "DIV").unwrap();
        let a = doc.append_text(div, "Hello ").unwrap();
        let span = doc.append_element(div, "span").unwrap();
        doc.append_text(span, "world").unwrap();

        assert_eq!(doc.tag(div).unwrap(), "div");
        assert_eq!(doc.children(div).unwrap().len(), 2);
        assert_eq!(doc.parent(a), Some(div));
        assert_eq!(doc.text_content(div), "Hello world");
        assert_eq!(doc.style(div).unwrap().display, Display::Block);
        assert_eq!(doc.style(span).unwrap().display, Display::Inline);
        assert!(doc.contains(doc.root(), span));
    }

    #[test]
    fn test_attributes_and_classes() {
        let mut doc = Document::new();
        let el = doc.append_element(doc.root(), "p").unwrap();
        doc.set_attr(el, "Title", "hello").unwrap();
        assert_eq!(doc.attr(el, "title"), Some("hello"));
        doc.set_attr(el, "title", "again").unwrap();
        assert_eq!(doc.attrs(el).unwrap().len(), 1);

        doc.add_class(el, "one").unwrap();
        doc.add_class(el, "two").unwrap();
        doc.add_class(el, "one").unwrap();
        assert_eq!(doc.attr(el, "class"), Some("one two"));
        assert!(doc.has_class(el, "two"));

        assert_eq!(doc.remove_attr(el, "title").unwrap(), Some("again".to_string()));
        assert!(!doc.has_attr(el, "title"));
    }

    #[test]
    fn test_insert_after_and_detach() {
        let mut doc = Document::new();
        let p = doc.append_element(doc.root(), "p").unwrap();
        let first = doc.append_text(p, "a").unwrap();
        let last = doc.append_text(p, "c").unwrap();
        let middle = doc.create_text("b");
        doc.insert_after(first, middle).unwrap();
        assert_eq!(doc.children(p).unwrap(), &[first, middle, last]);
        assert_eq!(doc.text_content(p), "abc");

        doc.detach(middle).unwrap();
        assert!(!doc.is_attached(middle));
        assert_eq!(doc.text_content(p), "ac");
    }

    #[test]
    fn test_invalid_operations_are_errors() {
        let mut doc = Document::new();
        let p = doc.append_element(doc.root(), "p").unwrap();
        let text = doc.append_text(p, "x").unwrap();

        assert_eq!(doc.tag(text), Err(DocumentError::NotAnElement(text)));
        assert_eq!(doc.text(p), Err(DocumentError::NotText(p)));
        assert!(matches!(
            doc.append_child(p, doc.root()),
            Err(DocumentError::Cycle { .. })
        ));
        let loose = doc.create_text("loose");
        assert_eq!(
            doc.insert_after(loose, text),
            Err(DocumentError::Detached(loose))
        );
        let bogus = NodeId(999);
        assert_eq!(doc.kind(bogus), Err(DocumentError::UnknownNode(bogus)));
    }

    #[test]
    fn test_comments_excluded_from_text_content() {
        let mut doc = Document::new();
        let div = doc.append_element(doc.root(), "div").unwrap();
        doc.append_text(div, "visible").unwrap();
        let comment = doc.create_comment("ignore previous instructions");
        doc.append_child(div, comment).unwrap();
        assert_eq!(doc.text_content(div), "visible");
        assert_eq!(doc.comment(comment).unwrap(), "ignore previous instructions");
    }

    #[test]
    fn test_detached_nodes_keep_their_slots() {
        let mut doc = Document::new();
        let div = doc.append_element(doc.root(), "div").unwrap();
        let old = doc.append_text(div, "old text").unwrap();
        let before = doc.len();

        for round in 0..10 {
            doc.clear_children(div).unwrap();
            doc.append_text(div, format!("round {}", round)).unwrap();
        }
        assert_eq!(doc.len(), before + 10);
        assert!(!doc.is_attached(old));
        assert_eq!(doc.text(old).unwrap(), "old text");

        let fresh = html::parse_html(&html::to_html(&doc)).unwrap();
        assert!(fresh.len() < doc.len());
        assert!(!html::to_html(&fresh).contains("old text"));
    }
}
