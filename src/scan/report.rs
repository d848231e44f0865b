//! Per-scan summaries and the sinks that consume them.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dom::Document;
use crate::safety::Detection;
use crate::scan::ScanOutcome;

/// Entries kept by an [`ActivityLog`].
pub const ACTIVITY_LOG_CAPACITY: usize = 100;

/// Where the scanned content came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageContext {
    pub title: Option<String>,
    pub url: Option<String>,
}

impl PageContext {
    pub fn new(title: Option<String>, url: Option<String>) -> Self {
        Self { title, url }
    }

    /// Take the title from the document's `title` element.
    pub fn from_document(doc: &Document, url: Option<String>) -> Self {
        Self {
            title: doc.title(),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportContext {
    pub title: Option<String>,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What a scan reports outward.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanSummary {
    Threats {
        count: usize,
        matches: Vec<Detection>,
        context: ReportContext,
    },
    Clean {
        count: usize,
    },
}

impl ScanSummary {
    pub fn new(outcome: &ScanOutcome, page: &PageContext, timestamp: DateTime<Utc>) -> Self {
        if outcome.is_clean() {
            return ScanSummary::Clean { count: 0 };
        }
        ScanSummary::Threats {
            count: outcome.findings.len(),
            matches: outcome.findings.clone(),
            context: ReportContext {
                title: page.title.clone(),
                url: page.url.clone(),
                timestamp,
            },
        }
    }

    pub fn count(&self) -> usize {
        match self {
            ScanSummary::Threats { count, .. } | ScanSummary::Clean { count } => *count,
        }
    }
}

/// Consumer of scan summaries.
pub trait ReportSink: Send + Sync {
    fn report(&self, summary: &ScanSummary);
}

/// Writes summaries to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ReportSink for TracingReporter {
    fn report(&self, summary: &ScanSummary) {
        match summary {
            ScanSummary::Threats {
                count,
                matches,
                context,
            } => {
                for detection in matches {
                    tracing::debug!(
                        kind = detection.finding.kind(),
                        subtype = detection.finding.subtype(),
                        score = detection.finding.score(),
                        sanitized = detection.sanitized,
                        "Threat detail"
                    );
                }
                tracing::info!(
                    count,
                    title = context.title.as_deref().unwrap_or(""),
                    url = context.url.as_deref().unwrap_or(""),
                    "Threats detected"
                );
            }
            ScanSummary::Clean { .. } => tracing::debug!("Scan clean"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub threat_count: usize,
    /// Kind of the first finding.
    pub threat_type: String,
    /// Comma-joined subtypes of all findings.
    pub details: String,
}

/// In-memory history of threat reports, newest first.
#[derive(Debug)]
pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(ACTIVITY_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ActivityEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for ActivityLog {
    fn report(&self, summary: &ScanSummary) {
        let ScanSummary::Threats {
            count,
            matches,
            context,
        } = summary
        else {
            return;
        };
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            timestamp: context.timestamp,
            title: context.title.clone(),
            url: context.url.clone(),
            threat_count: *count,
            threat_type: matches
                .first()
                .map(|d| d.finding.kind().to_string())
                .unwrap_or_default(),
            details: matches
                .iter()
                .map(|d| d.finding.subtype())
                .collect::<Vec<_>>()
                .join(", "),
        };
        let mut entries = self.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{Finding, SpanFinding};
    use pretty_assertions::assert_eq;

    fn outcome(subtypes: &[&str]) -> ScanOutcome {
        ScanOutcome {
            findings: subtypes
                .iter()
                .map(|s| Detection {
                    finding: Finding::MaliciousDirective(SpanFinding {
                        subtype: s.to_string(),
                        score: 1.0,
                        reasoning: vec![],
                        matched: "x".to_string(),
                        index: 0,
                        end: 1,
                    }),
                    sanitized: true,
                })
                .collect(),
            sanitized_count: subtypes.len(),
        }
    }

    fn page() -> PageContext {
        PageContext::new(Some("Inbox".to_string()), Some("https://mail.test/".to_string()))
    }

    #[test]
    fn test_clean_summary_shape() {
        let summary = ScanSummary::new(&ScanOutcome::default(), &page(), Utc::now());
        assert_eq!(serde_json::to_value(&summary).unwrap(), serde_json::json!({"count": 0}));
    }

    #[test]
    fn test_threat_summary_shape() {
        let summary = ScanSummary::new(&outcome(&["System Override"]), &page(), Utc::now());
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["matches"][0]["type"], "MALICIOUS_DIRECTIVE");
        assert_eq!(value["matches"][0]["sanitized"], true);
        assert_eq!(value["context"]["title"], "Inbox");
        assert!(value["context"]["timestamp"].is_string());
    }

    #[test]
    fn test_activity_log_newest_first_and_bounded() {
        let log = ActivityLog::with_capacity(2);
        log.report(&ScanSummary::Clean { count: 0 });
        assert!(log.is_empty());

        for subtypes in [&["A"][..], &["B", "C"][..], &["D"][..]] {
            log.report(&ScanSummary::new(&outcome(subtypes), &page(), Utc::now()));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].details, "D");
        assert_eq!(entries[1].details, "B, C");
        assert_eq!(entries[1].threat_count, 2);
        assert_eq!(entries[1].threat_type, "MALICIOUS_DIRECTIVE");
    }
}
