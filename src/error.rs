//! Error types shared across the scanning engine.

use std::time::Duration;

use crate::dom::NodeId;
use crate::semantic::EmbeddingError;

/// Errors raised when a node handle cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// The handle does not belong to this document.
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    /// The node was removed from the tree.
    #[error("Node {0} is detached from the document")]
    Detached(NodeId),

    /// An element operation was attempted on a text or comment node.
    #[error("Node {0} is not an element")]
    NotAnElement(NodeId),

    /// A text operation was attempted on a non-text node.
    #[error("Node {0} is not a text leaf")]
    NotText(NodeId),

    /// Inserting the node would create a cycle.
    #[error("Cannot insert {child} under its own descendant {parent}")]
    Cycle { parent: NodeId, child: NodeId },
}

/// Errors raised while neutralizing a range or node.
#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    /// The target already carries a sanitization marker.
    #[error("Node {0} was already sanitized")]
    AlreadySanitized(NodeId),

    /// The leaf-local offsets do not fit the current leaf text.
    #[error("Range {start}..{end} is invalid for leaf {leaf} ({len} bytes)")]
    InvalidRange {
        leaf: NodeId,
        start: usize,
        end: usize,
        len: usize,
    },

    /// The finding kind cannot be applied with this form.
    #[error("Finding kind {0} is not supported here")]
    UnsupportedFinding(&'static str),

    /// Tree mutation failed.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

/// Errors raised by the semantic classification service.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The service did not answer in time.
    #[error("Classification timed out after {0:?}")]
    Timeout(Duration),

    /// The embedding backend failed.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The message round-trip failed.
    #[error("Transport failed: {0}")]
    Transport(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A variable required by the selected backend is missing.
    #[error("Missing required setting {key}")]
    MissingRequired { key: String },
}

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;
