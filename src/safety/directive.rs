//! Pattern scanner for high-risk imperative phrases.

use regex::Regex;

use crate::safety::{Finding, SpanFinding};

/// Characters the reported window may extend before a hit.
pub const DEFAULT_CONTEXT_BEFORE: usize = 150;
/// Characters the reported window may extend after a hit.
pub const DEFAULT_CONTEXT_AFTER: usize = 250;

/// Paragraph break that stops window expansion.
const PARAGRAPH_BREAK: &str = "\n\n";

struct DirectivePattern {
    regex: Regex,
    name: &'static str,
    score: f32,
}

/// Scans flattened text for instruction-override, mode-switching, evasion,
/// exfiltration, credential-theft and financial-coercion phrasings.
pub struct PatternDetector {
    patterns: Vec<DirectivePattern>,
    context_before: usize,
    context_after: usize,
}

impl PatternDetector {
    /// Create a detector with the built-in pattern table.
    pub fn new() -> Self {
        let table: &[(&str, &'static str, f32)] = &[
            (
                r"ignore\s+(?:(?:the|this|previous|all|prior|any|earlier)\s+)+instructions?",
                "Instruction Override",
                1.0,
            ),
            (
                r"ignore\s+(?:(?:the|this|previous|all|prior)\s+)+directions",
                "Instruction Override",
                1.0,
            ),
            (r"ignore\s+what\s+I\s+said", "Instruction Override", 0.9),
            (
                r"forget\s+(?:all\s+)?(?:prior\s+|previous\s+)?instructions",
                "Instruction Override",
                1.0,
            ),
            (
                r"ignore\s+this\s+and\s+(?:send|write|print|display)",
                "Compound Injection",
                1.0,
            ),
            (
                r"disregard\s+(?:the|this|previous)\s+message",
                "Instruction Override",
                0.9,
            ),
            (r"system\s+override", "System Override", 1.0),
            (r"debug\s+mode", "Mode Switching", 0.8),
            (r"admin\s+mode", "Mode Switching", 0.8),
            (r"urgent\s+system\s+update", "False Urgency", 0.7),
            (r"do\s+not\s+alert\s+the\s+user", "Evasion Attempt", 1.0),
            (r"delete\s+this\s+email\s+after", "Trace Removal", 0.9),
            (r"forward\s+this\s+email\s+to", "Data Exfiltration", 0.9),
            (
                r"(?:forward|send)\s+(?:the|this|all)?\s*(?:following|before|above|previous|below)?\s*(?:mail|email|message|text|content)\s+to\s+(?:this\s+email\s*:?)?",
                "Data Exfiltration",
                0.95,
            ),
            (
                r"send\s+(?:the|this)?\s*.*\s*to\s+[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
                "Data Exfiltration",
                0.9,
            ),
            (r"retrieve\s+.*cookies", "Credential Theft", 1.0),
            (r"immediately\s+wire\s+transfer", "Financial Coercion", 1.0),
            (r"mandatory\s+update\s+for", "False Urgency", 0.8),
        ];

        let patterns = table
            .iter()
            .map(|(source, name, score)| DirectivePattern {
                regex: Regex::new(&format!("(?i){}", source))
                    .expect("built-in directive pattern"),
                name: *name,
                score: *score,
            })
            .collect();

        Self {
            patterns,
            context_before: DEFAULT_CONTEXT_BEFORE,
            context_after: DEFAULT_CONTEXT_AFTER,
        }
    }

    /// Set how far, in characters, a reported window may reach around a hit.
    pub fn with_context(mut self, before: usize, after: usize) -> Self {
        self.context_before = before;
        self.context_after = after;
        self
    }

    /// Scan text. Findings come out grouped by pattern in table order, and in
    /// text order within a pattern.
    pub fn scan(&self, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for pattern in &self.patterns {
            for mat in pattern.regex.find_iter(text) {
                let (index, end) = expand_window(
                    text,
                    mat.start(),
                    mat.end(),
                    self.context_before,
                    self.context_after,
                );
                findings.push(Finding::MaliciousDirective(SpanFinding {
                    subtype: pattern.name.to_string(),
                    score: pattern.score,
                    reasoning: vec![format!("Detected high-risk phrase: \"{}\"", pattern.name)],
                    matched: text[index..end].to_string(),
                    index,
                    end,
                }));
            }
        }
        findings
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Grow `[start, end)` to the enclosing paragraph, bounded by character
/// counts in each direction.
fn expand_window(
    text: &str,
    start: usize,
    end: usize,
    before: usize,
    after: usize,
) -> (usize, usize) {
    let mut lo = start;
    for _ in 0..before {
        if text[..lo].ends_with(PARAGRAPH_BREAK) {
            break;
        }
        match text[..lo].chars().next_back() {
            Some(c) => lo -= c.len_utf8(),
            None => break,
        }
    }

    let mut hi = end;
    for _ in 0..after {
        if text[hi..].starts_with(PARAGRAPH_BREAK) {
            break;
        }
        match text[hi..].chars().next() {
            Some(c) => hi += c.len_utf8(),
            None => break,
        }
    }

    (lo, hi)
}
