//! Scan session: serializes scans and tracks self-inflicted mutations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::dom::{Document, NodeId};
use crate::scan::{
    PageContext, ReportSink, ScanOutcome, ScanSummary, Scanner, TracingReporter,
};

/// Default quiet period after the session's own writes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1000);

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the scanning flag when a scan ends, however it ends.
struct ScanningGuard<'a>(&'a AtomicBool);

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the scanner and the state that used to live in globals: the scan
/// lock, the scanning flag and the time of the last write.
pub struct GuardSession {
    scanner: Scanner,
    lock: tokio::sync::Mutex<()>,
    scanning: AtomicBool,
    last_write: Mutex<Option<Instant>>,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ReportSink>,
}

impl GuardSession {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            lock: tokio::sync::Mutex::new(()),
            scanning: AtomicBool::new(false),
            last_write: Mutex::new(None),
            cooldown: DEFAULT_COOLDOWN,
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ReportSink>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Whether a content change should be treated as external. False while
    /// a scan runs and for the cooldown after a scan that wrote to the tree.
    pub fn accepts_mutations(&self) -> bool {
        if self.is_scanning() {
            return false;
        }
        let last_write = *self.last_write.lock().unwrap_or_else(|e| e.into_inner());
        match last_write {
            Some(at) => self.clock.now().saturating_duration_since(at) >= self.cooldown,
            None => true,
        }
    }

    /// Scan every root, report the aggregate and return it. Waits for any
    /// scan already in progress.
    pub async fn scan_now(
        &self,
        doc: &mut Document,
        roots: &[NodeId],
        page: &PageContext,
    ) -> ScanOutcome {
        let _lock = self.lock.lock().await;
        self.scanning.store(true, Ordering::SeqCst);
        let _scanning = ScanningGuard(&self.scanning);

        let mut outcome = ScanOutcome::default();
        for root in roots {
            outcome.merge(self.scanner.scan(doc, *root).await);
        }

        if outcome.sanitized_count > 0 {
            *self.last_write.lock().unwrap_or_else(|e| e.into_inner()) = Some(self.clock.now());
        }
        self.reporter
            .report(&ScanSummary::new(&outcome, page, chrono::Utc::now()));
        outcome
    }

    /// Scan the document body, or the whole document when it has none.
    pub async fn scan_document(&self, doc: &mut Document, page: &PageContext) -> ScanOutcome {
        let root = doc.find_element("body").unwrap_or_else(|| doc.root());
        self.scan_now(doc, &[root], page).await
    }
}
