//! Detection and neutralization of indirect prompt injection.
//!
//! This module provides:
//! - `PatternDetector` for high-confidence imperative phrases in flattened text
//! - `HiddenTextDetector` for instructional text hidden by visual tricks
//! - `EntityRedactor` for email and URL masking
//! - `Sanitizer`, the planner that rewrites the offending ranges and nodes

mod directive;
mod finding;
mod hidden_text;
mod redactor;
mod sanitizer;

pub use directive::{DEFAULT_CONTEXT_AFTER, DEFAULT_CONTEXT_BEFORE, PatternDetector};
pub use finding::{ContextFinding, Detection, Finding, NodeFinding, SpanFinding};
pub use hidden_text::{HIDDEN_SCORE_THRESHOLD, HiddenTextDetector};
pub use redactor::{EntityRedactor, SENDER_MARKER, URL_MARKER};
pub use sanitizer::{
    NEUTRALIZED_TEXT, RangeEdit, SANITIZED_ATTR, SCANNED_ATTR, Sanitizer, WARNING_CLASS,
    is_marked,
};
