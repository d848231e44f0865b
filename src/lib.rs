//! PageShield: detection and surgical neutralization of indirect prompt
//! injection in rendered page content.
//!
//! A scan flattens a document subtree into text, runs pattern, visibility and
//! embedding-based detectors over it, and rewrites only the offending ranges
//! and nodes so the rest of the page stays intact.

pub mod config;
pub mod dom;
pub mod error;
pub mod locator;
pub mod safety;
pub mod scan;
pub mod semantic;

pub use config::GuardConfig;
pub use error::{AnalysisError, ConfigError, DocumentError, SanitizeError};
pub use safety::{Detection, Finding};
pub use scan::{GuardSession, PageContext, ScanOutcome, Scanner};
