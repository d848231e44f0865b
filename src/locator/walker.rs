//! Lazy depth-first traversal over a [`Document`].

use crate::dom::{Document, NodeId, NodeKind};

/// One step of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// An element, before its children.
    Enter(NodeId),
    /// An element, after its children.
    Leave(NodeId),
    Text(NodeId),
    Comment(NodeId),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    /// Node still to visit, with the parent it was listed under.
    Visit(NodeId, Option<NodeId>),
    Leave(NodeId),
}

/// Lazy pre/post-order walk.
///
/// The walker borrows the document only for the duration of each
/// [`next`](TreeWalker::next) call, so the caller may mutate the tree between
/// steps. Children are snapshotted when their parent is entered; a listed node
/// that has since been detached or moved is skipped.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    stack: Vec<Step>,
    /// Stack height before the last `Enter` pushed its `Leave`.
    entered_mark: Option<usize>,
}

impl TreeWalker {
    pub fn new(root: NodeId) -> Self {
        Self {
            stack: vec![Step::Visit(root, None)],
            entered_mark: None,
        }
    }

    /// Prune the subtree of the element returned by the last `Enter`. No
    /// `Leave` is yielded for it. Has no effect after any other event.
    pub fn skip_children(&mut self) {
        if let Some(mark) = self.entered_mark.take() {
            self.stack.truncate(mark);
        }
    }

    pub fn next(&mut self, doc: &Document) -> Option<Visit> {
        self.entered_mark = None;
        while let Some(step) = self.stack.pop() {
            let (id, listed_under) = match step {
                Step::Leave(id) => return Some(Visit::Leave(id)),
                Step::Visit(id, parent) => (id, parent),
            };

            if listed_under.is_some() && doc.parent(id) != listed_under {
                tracing::debug!("Skipping node {} detached during traversal", id);
                continue;
            }

            match doc.kind(id) {
                Ok(NodeKind::Element) => {
                    let children = match doc.children(id) {
                        Ok(children) => children,
                        Err(e) => {
                            tracing::debug!("Skipping unreadable element {}: {}", id, e);
                            continue;
                        }
                    };
                    self.entered_mark = Some(self.stack.len());
                    self.stack.push(Step::Leave(id));
                    self.stack
                        .extend(children.iter().rev().map(|c| Step::Visit(*c, Some(id))));
                    return Some(Visit::Enter(id));
                }
                Ok(NodeKind::Text) => return Some(Visit::Text(id)),
                Ok(NodeKind::Comment) => return Some(Visit::Comment(id)),
                Err(e) => {
                    tracing::debug!("Skipping unreadable node {}: {}", id, e);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> (Document, NodeId, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let div = doc.append_element(doc.root(), "div").unwrap();
        let a = doc.append_text(div, "a").unwrap();
        let span = doc.append_element(div, "span").unwrap();
        let b = doc.append_text(span, "b").unwrap();
        (doc, div, a, span, b)
    }

    fn drain(walker: &mut TreeWalker, doc: &Document) -> Vec<Visit> {
        let mut visits = Vec::new();
        while let Some(visit) = walker.next(doc) {
            visits.push(visit);
        }
        visits
    }

    #[test]
    fn test_walk_order() {
        let (doc, div, a, span, b) = sample();
        let root = doc.root();
        let mut walker = TreeWalker::new(root);
        let visits = drain(&mut walker, &doc);
        assert_eq!(
            visits,
            vec![
                Visit::Enter(root),
                Visit::Enter(div),
                Visit::Text(a),
                Visit::Enter(span),
                Visit::Text(b),
                Visit::Leave(span),
                Visit::Leave(div),
                Visit::Leave(root),
            ]
        );
    }

    #[test]
    fn test_skip_children_prunes_subtree() {
        let (doc, div, a, span, _) = sample();
        let mut walker = TreeWalker::new(div);
        let mut seen = Vec::new();
        while let Some(visit) = walker.next(&doc) {
            if visit == Visit::Enter(span) {
                walker.skip_children();
                continue;
            }
            seen.push(visit);
        }
        assert_eq!(seen, vec![Visit::Enter(div), Visit::Text(a), Visit::Leave(div)]);
    }

    #[test]
    fn test_mutation_between_steps() {
        let (mut doc, div, a, span, _) = sample();
        let mut walker = TreeWalker::new(div);
        assert_eq!(walker.next(&doc), Some(Visit::Enter(div)));
        // Remove a node that was already listed.
        doc.detach(span).unwrap();
        assert_eq!(walker.next(&doc), Some(Visit::Text(a)));
        assert_eq!(walker.next(&doc), Some(Visit::Leave(div)));
        assert_eq!(walker.next(&doc), None);

        // A fresh walker over the same root sees the mutated tree.
        assert_eq!(drain(&mut TreeWalker::new(div), &doc).len(), 3);
    }
}
