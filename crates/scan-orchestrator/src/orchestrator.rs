use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use annotation_renderer::{AnnotationRenderer, FlaggedSpan};
use page_dom::{Document, NodeId, SharedDocument};
use relay_bridge::ClassifierRelay;
use scan_state::{ScanState, ScanStateStore};
use segmenter::{Segmenter, Sentence};
use sentinel_core_types::{now_millis, HighlightStyle, Notification, ScanSummary};
use sentinel_event_bus::NotificationBus;
use sentinel_policy_center::{ScanPolicy, ScanSettings};

use crate::classify::classify_all;
use crate::feed::ChangeFeed;
use crate::ScanError;

pub const DEFAULT_STOP_REASON: &str = "auto-scan-disabled";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanConfig {
    pub threshold: f64,
    pub style: HighlightStyle,
    /// Quiet period after the last mutation before queued targets are scanned.
    pub debounce: Duration,
}

impl ScanConfig {
    pub fn new(settings: ScanSettings, policy: &ScanPolicy) -> Self {
        Self {
            threshold: settings.threshold,
            style: settings.style,
            debounce: Duration::from_millis(policy.debounce_ms),
        }
    }

    pub fn from_policy(policy: &ScanPolicy) -> Self {
        Self::new(ScanSettings::from_policy(policy), policy)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from_policy(&sentinel_policy_center::default_policy().scan)
    }
}

struct PassTarget {
    node: NodeId,
    signature: String,
    flagged: Vec<FlaggedSpan>,
}

struct PassSentence {
    target: usize,
    sentence: Sentence,
}

/// Keeps `active` counting this pass until dropped, including when the pass future is
/// cancelled mid-await.
struct ActivePass<'a> {
    active: &'a AtomicUsize,
}

impl Drop for ActivePass<'_> {
    fn drop(&mut self) {
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }
}

/// Page-scoped scan driver: startup sweep, debounced mutation passes, batch
/// classification and the fail-closed abort.
pub struct ScanOrchestrator {
    doc: SharedDocument,
    segmenter: Arc<Segmenter>,
    state: Arc<ScanStateStore>,
    renderer: Arc<AnnotationRenderer>,
    classifier: Arc<dyn ClassifierRelay>,
    bus: NotificationBus,
    config: ScanConfig,
    active: AtomicUsize,
    aborted: AtomicBool,
    pending: Mutex<Vec<NodeId>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl ScanOrchestrator {
    pub fn new(
        doc: SharedDocument,
        segmenter: Arc<Segmenter>,
        state: Arc<ScanStateStore>,
        renderer: Arc<AnnotationRenderer>,
        classifier: Arc<dyn ClassifierRelay>,
        bus: NotificationBus,
        config: ScanConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            doc,
            segmenter,
            state,
            renderer,
            classifier,
            bus,
            config,
            active: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            debounce: Mutex::new(None),
            observer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Passes currently waiting on the classifier.
    pub fn active_passes(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Targets buffered for the next debounced pass.
    pub fn pending_targets(&self) -> Vec<NodeId> {
        self.pending.lock().clone()
    }

    pub fn is_observing(&self) -> bool {
        self.observer
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Sweeps the whole document once, then follows `feed`. When the sweep aborts every
    /// annotation is cleared and the feed is never polled.
    pub async fn start<F>(self: &Arc<Self>, feed: F) -> Result<ScanSummary, ScanError>
    where
        F: ChangeFeed + 'static,
    {
        let candidates = {
            let doc = self.doc.lock();
            self.segmenter.collect_targets(&doc, doc.body())
        };
        info!(target: "scan.orchestrator", candidates = candidates.len(), "startup sweep");
        let result = self.scan(candidates).await;
        if self.is_aborted() {
            {
                let mut doc = self.doc.lock();
                self.renderer.clear_all(&mut doc);
            }
            self.renderer.schedule_update();
            return Err(match result {
                Err(err) => err,
                Ok(_) => ScanError::Aborted,
            });
        }
        let summary = result?.unwrap_or_else(|| self.summary(0, 0, 0, 0, 0));
        self.follow(feed);
        Ok(summary)
    }

    fn follow<F>(self: &Arc<Self>, mut feed: F)
    where
        F: ChangeFeed + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(target: "scan.orchestrator", "no runtime, mutation observation disabled");
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            while let Some(batch) = feed.next_batch().await {
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                if orchestrator.is_aborted() {
                    break;
                }
                orchestrator.observe(&batch);
            }
        });
        if let Some(previous) = self.observer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Queues the targets contributed by `added` and restarts the debounce timer.
    pub fn observe(self: &Arc<Self>, added: &[NodeId]) {
        if self.is_aborted() {
            return;
        }
        let fresh = {
            let doc = self.doc.lock();
            let mut fresh: Vec<NodeId> = Vec::new();
            for node in added {
                for target in self.segmenter.collect_targets(&doc, *node) {
                    if !fresh.contains(&target) {
                        fresh.push(target);
                    }
                }
            }
            fresh
        };
        if fresh.is_empty() {
            return;
        }
        {
            let mut pending = self.pending.lock();
            for target in fresh {
                if !pending.contains(&target) {
                    pending.push(target);
                }
            }
        }
        self.arm_debounce();
    }

    fn arm_debounce(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(target: "scan.orchestrator", "no runtime, mutation scan not scheduled");
            return;
        };
        let weak = Arc::downgrade(self);
        let delay = self.config.debounce;
        let handle = runtime.spawn(async move {
            sleep(delay).await;
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.flush_pending();
            }
        });
        if let Some(previous) = self.debounce.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Drains the buffer into a background pass. Returns `None` when there was nothing
    /// to scan, scanning is aborted or no runtime is available.
    pub fn flush_pending(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let runtime = Handle::try_current().ok()?;
        let targets = std::mem::take(&mut *self.pending.lock());
        if targets.is_empty() || self.is_aborted() {
            return None;
        }
        let orchestrator = Arc::clone(self);
        Some(runtime.spawn(async move {
            if let Err(err) = orchestrator.scan(targets).await {
                debug!(target: "scan.orchestrator", error = %err, "queued pass ended without results");
            }
        }))
    }

    /// Runs one pass over `candidates`. Returns `None` when there was nothing to consider.
    pub async fn scan(
        self: &Arc<Self>,
        candidates: Vec<NodeId>,
    ) -> Result<Option<ScanSummary>, ScanError> {
        if self.is_aborted() {
            return Err(ScanError::Aborted);
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let (mut targets, sentences) = {
            let doc = self.doc.lock();
            self.gather(&doc, &candidates)
        };

        if sentences.is_empty() {
            let summary = self.summary(0, 0, 0, 0, 0);
            if self.active_passes() == 0 && !self.is_aborted() {
                self.bus.emit(Notification::ScanComplete {
                    flagged_elements: 0,
                    flagged_segments: 0,
                    summary: summary.clone(),
                });
            }
            return Ok(Some(summary));
        }

        let batch_size = sentences.len();
        let guard = ActivePass {
            active: &self.active,
        };
        let previous = self.active.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            self.bus.emit(Notification::ScanStart { batch_size });
        }
        self.bus.emit(Notification::ScanProgress {
            active: previous + 1,
            batch_size: Some(batch_size),
        });
        debug!(target: "scan.orchestrator", targets = targets.len(), sentences = batch_size, "pass dispatched");

        let texts: Vec<String> = sentences
            .iter()
            .map(|entry| entry.sentence.clean.clone())
            .collect();
        let classified = classify_all(self.classifier.as_ref(), &texts).await;

        let mut flagged_elements = 0;
        let mut flagged_segments = 0;
        let outcome = match classified {
            Ok(classified) => {
                for (entry, result) in sentences.iter().zip(&classified.results) {
                    if result.is_flagged(self.config.threshold) {
                        targets[entry.target].flagged.push(FlaggedSpan {
                            start: entry.sentence.start,
                            end: entry.sentence.end,
                            score: result.score,
                            label: result.label.clone(),
                            text: entry.sentence.clean.clone(),
                        });
                    }
                }
                {
                    let mut doc = self.doc.lock();
                    for target in &mut targets {
                        let spans = std::mem::take(&mut target.flagged);
                        let wrapped = if spans.is_empty() {
                            self.renderer.remove_highlight(&mut doc, target.node);
                            0
                        } else {
                            self.renderer.annotate(
                                &mut doc,
                                target.node,
                                Some(&target.signature),
                                spans,
                                self.config.style,
                            )
                        };
                        if wrapped > 0 {
                            flagged_elements += 1;
                            flagged_segments += wrapped;
                        }
                        if let Err(err) = self.state.mark_processed(target.node, &target.signature) {
                            warn!(target: "scan.orchestrator", node = %target.node, error = %err, "target changed state during the pass");
                        }
                    }
                }
                let summary = self.summary(
                    targets.len(),
                    flagged_elements,
                    flagged_segments,
                    batch_size,
                    classified.results.len(),
                );
                self.bus.emit(Notification::TelemetryUpdate {
                    last_scan: summary.clone(),
                });
                info!(
                    target: "scan.orchestrator",
                    processed = summary.processed_elements,
                    flagged_elements,
                    flagged_segments,
                    sentences = batch_size,
                    fallback = classified.fallback,
                    "pass complete"
                );
                Ok(summary)
            }
            Err(err) => {
                self.aborted.store(true, Ordering::SeqCst);
                let message = err.to_string();
                error!(target: "scan.orchestrator", error = %message, "classification failed, scanning aborted");
                self.bus.emit(Notification::ScanError {
                    message: message.clone(),
                });
                let mut doc = self.doc.lock();
                for target in &targets {
                    if let Err(err) = self.state.revert(target.node) {
                        warn!(target: "scan.orchestrator", node = %target.node, error = %err, "could not revert target");
                    }
                    self.renderer.remove_highlight(&mut doc, target.node);
                }
                Err(ScanError::Unrecoverable(message))
            }
        };

        drop(guard);
        let active = self.active_passes();
        match &outcome {
            Ok(summary) if active == 0 && !self.is_aborted() => {
                self.bus.emit(Notification::ScanComplete {
                    flagged_elements,
                    flagged_segments,
                    summary: summary.clone(),
                });
            }
            _ => self.bus.emit(Notification::ScanProgress {
                active,
                batch_size: None,
            }),
        }
        self.renderer.schedule_update();
        outcome.map(Some)
    }

    /// Selects the candidates that still need classification, claiming their signatures
    /// before any await. Targets without sentences are marked processed on the spot.
    fn gather(&self, doc: &Document, candidates: &[NodeId]) -> (Vec<PassTarget>, Vec<PassSentence>) {
        let mut targets = Vec::new();
        let mut sentences = Vec::new();
        for &node in candidates {
            if !doc.is_connected(node) || self.state.state(node) != ScanState::Unscanned {
                continue;
            }
            let signature = self.state.identify(doc, node);
            if self.state.contains(&signature) {
                continue;
            }
            let segmented = self.segmenter.segment(doc, node);
            if segmented.is_empty() {
                if let Err(err) = self.state.mark_processed(node, &signature) {
                    warn!(target: "scan.orchestrator", %node, error = %err, "could not mark empty target");
                }
                continue;
            }
            if let Err(err) = self.state.begin_processing(node, &signature) {
                warn!(target: "scan.orchestrator", %node, error = %err, "target not claimable");
                continue;
            }
            self.state.claim(&signature);
            let index = targets.len();
            targets.push(PassTarget {
                node,
                signature,
                flagged: Vec::new(),
            });
            sentences.extend(segmented.into_iter().map(|sentence| PassSentence {
                target: index,
                sentence,
            }));
        }
        (targets, sentences)
    }

    fn summary(
        &self,
        processed_elements: usize,
        flagged_elements: usize,
        flagged_segments: usize,
        total_sentences: usize,
        batch_size: usize,
    ) -> ScanSummary {
        ScanSummary {
            threshold: self.config.threshold,
            style: self.config.style,
            processed_elements,
            flagged_elements,
            flagged_segments,
            total_sentences,
            batch_size,
            timestamp: now_millis(),
        }
    }

    /// Permanently disables scanning for this page.
    pub fn stop(&self, reason: Option<&str>, reset_highlights: bool) {
        self.aborted.store(true, Ordering::SeqCst);
        if let Some(handle) = self.debounce.lock().take() {
            handle.abort();
        }
        self.pending.lock().clear();
        if let Some(handle) = self.observer.lock().take() {
            handle.abort();
        }
        if reset_highlights {
            let mut doc = self.doc.lock();
            self.renderer.clear_all(&mut doc);
        }
        self.renderer.schedule_update();
        let reason = reason.unwrap_or(DEFAULT_STOP_REASON).to_string();
        info!(target: "scan.orchestrator", %reason, reset_highlights, "scanning stopped");
        self.bus.emit(Notification::ScanStopped {
            reason,
            timestamp: now_millis(),
        });
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.debounce.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.observer.get_mut().take() {
            handle.abort();
        }
    }
}
