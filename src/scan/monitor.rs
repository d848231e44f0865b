//! Coalescing of content-change notifications into scan roots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dom::{Document, NodeId, NodeKind};
use crate::scan::Clock;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Collects changed nodes until the debounce window passes, then hands out
/// a deduplicated set of roots.
pub struct ChangeBatcher {
    clock: Arc<dyn Clock>,
    debounce: Duration,
    priority_classes: Vec<String>,
    pending: Vec<NodeId>,
    deadline: Option<Instant>,
    urgent: bool,
}

impl ChangeBatcher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            debounce: DEFAULT_DEBOUNCE,
            priority_classes: Vec::new(),
            pending: Vec::new(),
            deadline: None,
            urgent: false,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Changes inside an element carrying one of these classes make the
    /// batch ready at once.
    pub fn with_priority_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Record a change to `target`. Text and comment targets are recorded as
    /// their parent element. Every change restarts the debounce window.
    pub fn record(&mut self, doc: &Document, target: NodeId) {
        let element = match doc.kind(target) {
            Ok(NodeKind::Element) => Some(target),
            Ok(_) => doc.parent(target),
            Err(e) => {
                tracing::debug!("Ignoring change on {}: {}", target, e);
                None
            }
        };
        let Some(element) = element else {
            return;
        };

        if self.is_priority(doc, element) {
            self.urgent = true;
        }
        if !self.pending.contains(&element) {
            self.pending.push(element);
        }
        self.deadline = Some(self.clock.now() + self.debounce);
    }

    fn is_priority(&self, doc: &Document, element: NodeId) -> bool {
        if self.priority_classes.is_empty() {
            return false;
        }
        let mut current = Some(element);
        while let Some(id) = current {
            if self.priority_classes.iter().any(|c| doc.has_class(id, c)) {
                return true;
            }
            current = doc.parent(id);
        }
        false
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the pending changes should be scanned now.
    pub fn is_ready(&self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.urgent || self.deadline.is_some_and(|d| self.clock.now() >= d)
    }

    /// Drain the batch. Detached targets and targets nested inside another
    /// target are dropped; the rest come back in document order.
    pub fn take_roots(&mut self, doc: &Document) -> Vec<NodeId> {
        let pending = std::mem::take(&mut self.pending);
        self.deadline = None;
        self.urgent = false;

        let attached: Vec<NodeId> = pending
            .into_iter()
            .filter(|id| doc.is_attached(*id))
            .collect();
        let mut roots: Vec<NodeId> = attached
            .iter()
            .copied()
            .filter(|id| {
                !attached
                    .iter()
                    .any(|other| other != id && doc.contains(*other, *id))
            })
            .collect();

        let order: HashMap<NodeId, usize> = doc
            .preorder(doc.root())
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        roots.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::html::parse_html;
    use crate::scan::ManualClock;
    use pretty_assertions::assert_eq;

    fn fixture() -> Document {
        parse_html(
            "<html><body><div id=\"a\"><p>one</p></div><div id=\"b\" class=\"mail-body\"><p>two</p></div></body></html>",
        )
        .unwrap()
    }

    fn find(doc: &Document, tag: &str, nth: usize) -> NodeId {
        doc.preorder(doc.root())
            .into_iter()
            .filter(|id| doc.tag(*id).map(|t| t == tag).unwrap_or(false))
            .nth(nth)
            .unwrap()
    }

    #[test]
    fn test_debounce_restarts_on_change() {
        let clock = Arc::new(ManualClock::new());
        let mut batcher = ChangeBatcher::new(clock.clone());
        let doc = fixture();
        let first_p = find(&doc, "p", 0);

        assert!(!batcher.is_ready());
        batcher.record(&doc, first_p);
        clock.advance(Duration::from_millis(400));
        assert!(!batcher.is_ready());

        batcher.record(&doc, first_p);
        clock.advance(Duration::from_millis(400));
        assert!(!batcher.is_ready());
        assert_eq!(batcher.pending(), 1);

        clock.advance(Duration::from_millis(100));
        assert!(batcher.is_ready());
    }

    #[test]
    fn test_priority_class_is_immediate() {
        let clock = Arc::new(ManualClock::new());
        let mut batcher = ChangeBatcher::new(clock).with_priority_classes(["mail-body"]);
        let doc = fixture();
        batcher.record(&doc, find(&doc, "p", 0));
        assert!(!batcher.is_ready());

        let text = doc.children(find(&doc, "p", 1)).unwrap()[0];
        batcher.record(&doc, text);
        assert!(batcher.is_ready());
    }

    #[test]
    fn test_take_roots_dedupes_nested_and_detached() {
        let clock = Arc::new(ManualClock::new());
        let mut batcher = ChangeBatcher::new(clock);
        let mut doc = fixture();
        let div_a = find(&doc, "div", 0);
        let div_b = find(&doc, "div", 1);
        let p_a = find(&doc, "p", 0);
        let p_b = find(&doc, "p", 1);

        batcher.record(&doc, p_b);
        batcher.record(&doc, p_a);
        batcher.record(&doc, div_a);
        batcher.record(&doc, div_b);
        doc.detach(div_b).unwrap();

        assert_eq!(batcher.take_roots(&doc), vec![div_a]);
        assert_eq!(batcher.pending(), 0);
        assert!(batcher.deadline().is_none());
    }

    #[test]
    fn test_roots_in_document_order() {
        let clock = Arc::new(ManualClock::new());
        let mut batcher = ChangeBatcher::new(clock);
        let doc = fixture();
        let p_a = find(&doc, "p", 0);
        let p_b = find(&doc, "p", 1);
        batcher.record(&doc, p_b);
        batcher.record(&doc, p_a);
        assert_eq!(batcher.take_roots(&doc), vec![p_a, p_b]);
    }
}
