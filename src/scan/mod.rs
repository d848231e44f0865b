//! Scan orchestration and the session state around it.
//!
//! - `Scanner` walks a subtree once, then runs the pattern and semantic passes
//! - `AnalysisService` is the seam to the embedding classifier
//! - `GuardSession` serializes scans and tracks the self-write cooldown
//! - `ChangeBatcher` turns change notifications into scan roots
//! - `ReportSink` implementations consume per-scan summaries

mod analysis;
mod monitor;
mod report;
mod scanner;
mod session;

pub use analysis::{AnalysisService, LocalAnalysis};
pub use monitor::{ChangeBatcher, DEFAULT_DEBOUNCE};
pub use report::{
    ACTIVITY_LOG_CAPACITY, ActivityEntry, ActivityLog, PageContext, ReportContext, ReportSink,
    ScanSummary, TracingReporter,
};
pub use scanner::{DEFAULT_ANALYSIS_TIMEOUT, REDACTED_ATTR, ScanOptions, ScanOutcome, Scanner};
pub use session::{Clock, DEFAULT_COOLDOWN, GuardSession, ManualClock, SystemClock};
