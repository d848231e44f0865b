//! Findings produced by the detectors.

use serde::{Deserialize, Serialize};

use crate::dom::NodeId;
use crate::semantic::ContextLabel;

/// A detection, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Finding {
    /// Content hidden from a human but readable by text extraction.
    HiddenText(NodeFinding),
    /// An imperative phrase aimed at an agent, from the pattern table or a
    /// zero-tolerance semantic category.
    MaliciousDirective(SpanFinding),
    /// A risk-category chunk that is an outlier in its document.
    RoleConflict(ContextFinding),
}

/// A node-level finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFinding {
    pub score: f32,
    pub reasoning: Vec<String>,
    pub node: NodeId,
    /// Leading text of the node at detection time.
    pub excerpt: String,
}

/// A finding over `[index, end)` of the flattened text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanFinding {
    pub subtype: String,
    pub score: f32,
    pub reasoning: Vec<String>,
    #[serde(rename = "match")]
    pub matched: String,
    pub index: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFinding {
    #[serde(flatten)]
    pub span: SpanFinding,
    /// Topic of the whole document.
    pub document_context: ContextLabel,
    /// Category the chunk resembles.
    pub chunk_context: ContextLabel,
}

impl Finding {
    /// Wire name of the finding kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Finding::HiddenText(_) => "HIDDEN_TEXT",
            Finding::MaliciousDirective(_) => "MALICIOUS_DIRECTIVE",
            Finding::RoleConflict(_) => "ROLE_CONFLICT",
        }
    }

    pub fn subtype(&self) -> &str {
        match self {
            Finding::HiddenText(_) => "Hidden Text",
            Finding::MaliciousDirective(span) => &span.subtype,
            Finding::RoleConflict(ctx) => &ctx.span.subtype,
        }
    }

    pub fn score(&self) -> f32 {
        match self {
            Finding::HiddenText(n) => n.score,
            Finding::MaliciousDirective(span) => span.score,
            Finding::RoleConflict(ctx) => ctx.span.score,
        }
    }

    pub fn reasoning(&self) -> &[String] {
        match self {
            Finding::HiddenText(n) => &n.reasoning,
            Finding::MaliciousDirective(span) => &span.reasoning,
            Finding::RoleConflict(ctx) => &ctx.span.reasoning,
        }
    }

    /// Flattened-text span, absent for node-level findings.
    pub fn span(&self) -> Option<&SpanFinding> {
        match self {
            Finding::HiddenText(_) => None,
            Finding::MaliciousDirective(span) => Some(span),
            Finding::RoleConflict(ctx) => Some(&ctx.span),
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            Finding::HiddenText(n) => Some(n.node),
            _ => None,
        }
    }

    /// The text the finding is about.
    pub fn matched(&self) -> &str {
        match self {
            Finding::HiddenText(n) => &n.excerpt,
            Finding::MaliciousDirective(span) => &span.matched,
            Finding::RoleConflict(ctx) => &ctx.span.matched,
        }
    }
}

/// A finding together with whether the planner neutralized it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub finding: Finding,
    pub sanitized: bool,
}
