//! Scan orchestration: one traversal, then the pattern and semantic passes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::dom::{Document, NodeId};
use crate::error::AnalysisError;
use crate::locator::{TextMap, TextMapBuilder, TreeWalker, Visit};
use crate::safety::{Detection, Finding, HiddenTextDetector, PatternDetector, Sanitizer};
use crate::scan::AnalysisService;

/// Default bound on one classification round-trip.
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(10);

/// Set on elements whose text or link had entities redacted.
pub const REDACTED_ATTR: &str = "data-pageshield-redacted";

const DISABLED_LINK_STYLE: &str = "cursor:not-allowed;color:gray;text-decoration:line-through";

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Redact emails and URLs in every text leaf and scrub mail links.
    pub redact_entities: bool,
    /// Addresses left alone by redaction, compared case-insensitively.
    pub safe_senders: Vec<String>,
    /// Submit the flattened text to the analysis service.
    pub semantic: bool,
    pub analysis_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            redact_entities: false,
            safe_senders: Vec::new(),
            semantic: true,
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }
}

/// Result of scanning one or more roots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub findings: Vec<Detection>,
    /// Findings whose neutralization changed the tree.
    pub sanitized_count: usize,
}

impl ScanOutcome {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn merge(&mut self, other: ScanOutcome) {
        self.findings.extend(other.findings);
        self.sanitized_count += other.sanitized_count;
    }
}

/// Runs the detectors over a subtree and neutralizes what they find.
pub struct Scanner {
    patterns: PatternDetector,
    hidden: HiddenTextDetector,
    sanitizer: Sanitizer,
    analysis: Option<Arc<dyn AnalysisService>>,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            patterns: PatternDetector::new(),
            hidden: HiddenTextDetector::new(),
            sanitizer: Sanitizer::new(),
            analysis: None,
            options,
        }
    }

    pub fn with_patterns(mut self, patterns: PatternDetector) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_analysis(mut self, analysis: Arc<dyn AnalysisService>) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Scan the subtree at `root`. Never fails: per-node and per-finding
    /// errors are logged and the scan moves on.
    pub async fn scan(&self, doc: &mut Document, root: NodeId) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        if !doc.is_attached(root) {
            tracing::warn!("Scan root {} is not attached, skipping", root);
            return outcome;
        }

        let mut map = self.walk(doc, root, &mut outcome);
        let text = map.text().to_string();
        if text.trim().is_empty() {
            return outcome;
        }

        for finding in self.patterns.scan(&text) {
            self.apply_span(doc, &mut map, finding, &mut outcome);
        }

        if self.options.semantic {
            if let Some(service) = &self.analysis {
                for finding in self.analyze(service.as_ref(), &text).await {
                    self.apply_span(doc, &mut map, finding, &mut outcome);
                }
            }
        }

        if !outcome.is_clean() {
            tracing::info!(
                findings = outcome.findings.len(),
                sanitized = outcome.sanitized_count,
                "Scan of {} found threats",
                root
            );
        }
        outcome
    }

    /// The single traversal: strip carriers, optionally redact, neutralize
    /// hidden nodes and build the text map.
    fn walk(&self, doc: &mut Document, root: NodeId, outcome: &mut ScanOutcome) -> TextMap {
        let mut walker = TreeWalker::new(root);
        let mut builder = TextMapBuilder::new();

        while let Some(visit) = walker.next(doc) {
            match visit {
                Visit::Comment(id) => self.strip_carrier(doc, id),
                Visit::Enter(id) => {
                    if is_inert_script(doc, id) {
                        walker.skip_children();
                        self.strip_carrier(doc, id);
                        continue;
                    }
                    if !builder.admits(doc, id) {
                        walker.skip_children();
                        continue;
                    }
                    if self.options.redact_entities {
                        self.scrub_link(doc, id);
                    }
                    if let Some(finding) = self.hidden.scan_node(doc, id) {
                        walker.skip_children();
                        let sanitized = match self.sanitizer.apply_to_node(doc, id, &finding) {
                            Ok(()) => {
                                outcome.sanitized_count += 1;
                                true
                            }
                            Err(e) => {
                                tracing::warn!("Failed to neutralize hidden node {}: {}", id, e);
                                false
                            }
                        };
                        outcome.findings.push(Detection { finding, sanitized });
                    }
                }
                Visit::Leave(id) => builder.close_element(doc, id),
                Visit::Text(id) => {
                    if self.options.redact_entities {
                        self.redact_leaf(doc, id);
                    }
                    match doc.text(id) {
                        Ok(text) => builder.push_leaf(id, text),
                        Err(e) => tracing::debug!("Skipping unreadable leaf {}: {}", id, e),
                    }
                }
            }
        }
        builder.finish()
    }

    fn strip_carrier(&self, doc: &mut Document, id: NodeId) {
        match doc.detach(id) {
            Ok(()) => tracing::debug!("Removed carrier node {}", id),
            Err(e) => tracing::warn!("Carrier cleanup failed for {}: {}", id, e),
        }
    }

    fn redact_leaf(&self, doc: &mut Document, leaf: NodeId) {
        let Ok(text) = doc.text(leaf) else {
            return;
        };
        let redactor = self.sanitizer.redactor();
        if !redactor.contains_entities(text) {
            return;
        }
        let redacted = redactor.redact(text, &self.options.safe_senders);
        if redacted == text {
            return;
        }
        let result = doc.set_text(leaf, redacted).and_then(|()| match doc.parent(leaf) {
            Some(parent) if doc.is_element(parent) => doc.set_attr(parent, REDACTED_ATTR, "true"),
            _ => Ok(()),
        });
        if let Err(e) = result {
            tracing::warn!("Failed to redact leaf {}: {}", leaf, e);
        }
    }

    /// Disable mail links unless every address in them is a safe sender.
    fn scrub_link(&self, doc: &mut Document, element: NodeId) {
        if doc.tag(element).map(|t| t != "a").unwrap_or(true) {
            return;
        }
        let Some(href) = doc.attr(element, "href") else {
            return;
        };
        if !href.contains("mailto:") && !href.contains('@') {
            return;
        }
        let emails = self.sanitizer.redactor().emails(href);
        let all_safe = !emails.is_empty()
            && emails.iter().all(|email| {
                self.options
                    .safe_senders
                    .iter()
                    .any(|safe| safe.eq_ignore_ascii_case(email))
            });
        if all_safe {
            return;
        }

        tracing::info!("Disabled mail link on {}", element);
        let result = (|| {
            doc.remove_attr(element, "href")?;
            doc.set_attr(element, REDACTED_ATTR, "true")?;
            doc.set_attr(element, "title", "Link disabled for safety")?;
            doc.set_attr(element, "style", DISABLED_LINK_STYLE)?;
            let font = doc.style(element)?.font_size;
            doc.style_mut(element)?
                .apply_declarations(DISABLED_LINK_STYLE, font);
            Ok::<(), crate::error::DocumentError>(())
        })();
        if let Err(e) = result {
            tracing::warn!("Failed to disable link {}: {}", element, e);
        }
    }

    /// Ask the service for semantic findings, degrading to none on failure.
    async fn analyze(&self, service: &dyn AnalysisService, text: &str) -> Vec<Finding> {
        let timeout = self.options.analysis_timeout;
        let result = match tokio::time::timeout(timeout, service.analyze(text)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(timeout)),
        };
        match result {
            Ok(findings) => findings
                .into_iter()
                .filter(|f| {
                    let usable = f.span().is_some();
                    if !usable {
                        tracing::warn!(
                            "{} returned a {} finding without a span, ignoring",
                            service.name(),
                            f.kind()
                        );
                    }
                    usable
                })
                .collect(),
            Err(e) => {
                tracing::warn!(
                    "Semantic analysis via {} unavailable, continuing without it: {}",
                    service.name(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Resolve a span finding to leaf ranges and neutralize each of them.
    fn apply_span(
        &self,
        doc: &mut Document,
        map: &mut TextMap,
        finding: Finding,
        outcome: &mut ScanOutcome,
    ) {
        let Some((start, end)) = finding.span().map(|s| (s.index, s.end)) else {
            return;
        };

        if map.is_neutralized(start, end) {
            tracing::debug!("{} at {}..{} already neutralized", finding.subtype(), start, end);
            outcome.findings.push(Detection {
                finding,
                sanitized: true,
            });
            return;
        }

        let ranges = map.ranges(start, end);
        if ranges.is_empty() {
            tracing::warn!(
                "Could not resolve {}..{} for {} in the flattened text",
                start,
                end,
                finding.subtype()
            );
        }

        let mut sanitized = false;
        for range in &ranges {
            match self.sanitizer.apply_to_range(doc, range, &finding) {
                Ok(edit) => {
                    map.mark_neutralized(range, edit.tail);
                    sanitized = true;
                }
                Err(e) => tracing::warn!("Failed to sanitize range in {}: {}", range.leaf, e),
            }
        }
        if sanitized {
            outcome.sanitized_count += 1;
        }
        outcome.findings.push(Detection { finding, sanitized });
    }
}

fn is_inert_script(doc: &Document, id: NodeId) -> bool {
    doc.tag(id).map(|t| t == "script").unwrap_or(false)
        && doc
            .attr(id, "type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("text/plain"))
}
