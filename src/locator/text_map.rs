//! Flattened text stream with a reverse map back to text leaves.

use serde::Serialize;

use crate::dom::{Display, Document, NodeId};
use crate::locator::walker::{TreeWalker, Visit};
use crate::locator::is_infrastructure;
use crate::safety::is_marked;

/// Separator emitted after block-level containers.
const BLOCK_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Text copied from a leaf.
    Text,
    /// Inserted block separator with no source leaf.
    Virtual,
    /// Span whose leaf content was replaced during the current scan.
    Neutralized,
}

/// A slice `[start, end)` of the flattened text and where it came from.
///
/// A `Text` segment always covers its leaf from leaf offset 0, so leaf-local
/// offsets are `flat - start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    pub leaf: Option<NodeId>,
    pub start: usize,
    pub end: usize,
    pub kind: SegmentKind,
}

impl TextSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A leaf-local sub-range resolved from a flattened slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeafRange {
    pub leaf: NodeId,
    /// Inclusive byte offset within the leaf text.
    pub start: usize,
    /// Exclusive byte offset within the leaf text.
    pub end: usize,
    /// Where `start` sits in the flattened text.
    pub flat_start: usize,
}

impl LeafRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Accumulates segments while a caller walks the tree.
#[derive(Debug, Default)]
pub struct TextMapBuilder {
    text: String,
    segments: Vec<TextSegment>,
}

impl TextMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the walk should descend into `node`. Infrastructure elements
    /// and planner output are pruned; visually hidden nodes are not.
    pub fn admits(&self, doc: &Document, node: NodeId) -> bool {
        match doc.tag(node) {
            Ok(tag) => !is_infrastructure(tag) && !is_marked(doc, node),
            Err(_) => true,
        }
    }

    /// Append a leaf's text. Empty leaves produce no segment.
    pub fn push_leaf(&mut self, leaf: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        self.push(Some(leaf), text, SegmentKind::Text);
    }

    /// Called after the children of an admitted element were visited.
    pub fn close_element(&mut self, doc: &Document, element: NodeId) {
        let Ok(tag) = doc.tag(element) else {
            return;
        };
        let by_tag = tag == "br" || Display::for_tag(tag).is_block();
        let by_style = doc.style(element).map(|s| s.display.is_block()).unwrap_or(false);
        if by_tag || by_style {
            self.push(None, BLOCK_SEPARATOR, SegmentKind::Virtual);
        }
    }

    fn push(&mut self, leaf: Option<NodeId>, text: &str, kind: SegmentKind) {
        let start = self.text.len();
        self.text.push_str(text);
        self.segments.push(TextSegment {
            leaf,
            start,
            end: self.text.len(),
            kind,
        });
    }

    pub fn finish(self) -> TextMap {
        TextMap {
            text: self.text,
            segments: self.segments,
        }
    }
}

/// Flattened text of a subtree plus the segments it was built from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TextMap {
    text: String,
    segments: Vec<TextSegment>,
}

impl TextMap {
    /// Flatten the subtree at `root` in one walk.
    pub fn build(doc: &Document, root: NodeId) -> Self {
        let mut walker = TreeWalker::new(root);
        let mut builder = TextMapBuilder::new();
        while let Some(visit) = walker.next(doc) {
            match visit {
                Visit::Enter(id) => {
                    if !builder.admits(doc, id) {
                        walker.skip_children();
                    }
                }
                Visit::Leave(id) => builder.close_element(doc, id),
                Visit::Text(id) => match doc.text(id) {
                    Ok(text) => builder.push_leaf(id, text),
                    Err(e) => tracing::debug!("Skipping unreadable leaf {}: {}", id, e),
                },
                Visit::Comment(_) => {}
            }
        }
        builder.finish()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[TextSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn is_valid_span(&self, start: usize, end: usize) -> bool {
        start < end
            && end <= self.text.len()
            && self.text.is_char_boundary(start)
            && self.text.is_char_boundary(end)
    }

    /// Segments intersecting `[start, end)`, in order.
    fn intersecting(&self, start: usize, end: usize) -> impl Iterator<Item = &TextSegment> {
        let first = self.segments.partition_point(|s| s.end <= start);
        self.segments[first..]
            .iter()
            .take_while(move |s| s.start < end)
    }

    /// Resolve a flattened slice into leaf-local ranges, in document order.
    /// Virtual and neutralized segments are not addressable and are left out.
    /// Invalid spans resolve to nothing.
    pub fn ranges(&self, start: usize, end: usize) -> Vec<LeafRange> {
        if !self.is_valid_span(start, end) {
            return Vec::new();
        }
        self.intersecting(start, end)
            .filter(|s| s.kind == SegmentKind::Text)
            .filter_map(|s| {
                let leaf = s.leaf?;
                let lo = start.max(s.start);
                let hi = end.min(s.end);
                (lo < hi).then(|| LeafRange {
                    leaf,
                    start: lo - s.start,
                    end: hi - s.start,
                    flat_start: lo,
                })
            })
            .collect()
    }

    /// Record that `range` was replaced by a marker. The leaf keeps the text
    /// before the range; text after it now lives in `tail`. Returns false if
    /// `range` no longer matches a text segment.
    pub fn mark_neutralized(&mut self, range: &LeafRange, tail: Option<NodeId>) -> bool {
        let Some(pos) = self.segments.iter().position(|s| {
            s.kind == SegmentKind::Text
                && s.leaf == Some(range.leaf)
                && s.start <= range.flat_start
                && range.flat_start < s.end
        }) else {
            return false;
        };

        let seg = self.segments[pos];
        let cut_start = range.flat_start;
        let cut_end = (range.flat_start + range.len()).min(seg.end);
        let mut replacement = Vec::with_capacity(3);
        if cut_start > seg.start {
            replacement.push(TextSegment {
                end: cut_start,
                ..seg
            });
        }
        replacement.push(TextSegment {
            leaf: None,
            start: cut_start,
            end: cut_end,
            kind: SegmentKind::Neutralized,
        });
        if cut_end < seg.end {
            match tail {
                Some(tail) => replacement.push(TextSegment {
                    leaf: Some(tail),
                    start: cut_end,
                    end: seg.end,
                    kind: SegmentKind::Text,
                }),
                None => replacement.push(TextSegment {
                    leaf: None,
                    start: cut_end,
                    end: seg.end,
                    kind: SegmentKind::Neutralized,
                }),
            }
        }
        self.segments.splice(pos..=pos, replacement);
        true
    }

    /// Whether `[start, end)` touches no live text and at least one
    /// neutralized span.
    pub fn is_neutralized(&self, start: usize, end: usize) -> bool {
        if !self.is_valid_span(start, end) {
            return false;
        }
        let mut any_neutralized = false;
        for seg in self.intersecting(start, end) {
            match seg.kind {
                SegmentKind::Text => return false,
                SegmentKind::Neutralized => any_neutralized = true,
                SegmentKind::Virtual => {}
            }
        }
        any_neutralized
    }
}
