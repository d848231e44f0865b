//! Tree-to-text mapping.
//!
//! Flattens a document subtree into a single string for the text detectors
//! and resolves offsets in that string back to leaf-local ranges the planner
//! can rewrite.

mod text_map;
mod walker;

pub use text_map::{LeafRange, SegmentKind, TextMap, TextMapBuilder, TextSegment};
pub use walker::{TreeWalker, Visit};

/// Element kinds whose content never enters the flattened text.
pub const INFRASTRUCTURE_TAGS: &[&str] = &[
    "script", "style", "noscript", "link", "meta", "head", "title", "svg", "iframe", "frame",
    "object", "embed",
];

pub fn is_infrastructure(tag: &str) -> bool {
    INFRASTRUCTURE_TAGS.contains(&tag)
}
