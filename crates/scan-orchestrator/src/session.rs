use std::sync::Arc;

use tracing::debug;

use annotation_renderer::{AnnotationRenderer, ControlOutcome, RenderError, RendererConfig};
use feedback_queue::{FeedbackConfig, FeedbackQueue};
use page_dom::{shared, Document, NodeId, SharedDocument, Viewport};
use relay_bridge::{ClassifierRelay, FeedbackRelay, OnlineFlag, SharedStore};
use scan_state::ScanStateStore;
use segmenter::{Segmenter, SegmenterConfig};
use sentinel_core_types::ScanSummary;
use sentinel_event_bus::NotificationBus;
use sentinel_policy_center::{ScanPolicy, ScanSettings, SentinelPolicy};

use crate::feed::ChangeFeed;
use crate::orchestrator::{ScanConfig, ScanOrchestrator};
use crate::ScanError;

/// Host-provided collaborators for one page.
pub struct SessionPorts {
    pub classifier: Arc<dyn ClassifierRelay>,
    pub feedback_relay: Arc<dyn FeedbackRelay>,
    /// `None` when persistence is unavailable; feedback queueing then fails softly.
    pub store: Option<SharedStore>,
    pub connectivity: Arc<OnlineFlag>,
    pub bus: NotificationBus,
}

pub fn segmenter_config(scan: &ScanPolicy) -> SegmenterConfig {
    SegmenterConfig {
        text_selectors: scan.text_selectors.clone(),
        content_blocks: scan.content_blocks.clone(),
        ignore_selectors: scan.ignore_selectors.clone(),
        min_text_length: scan.min_text_length,
    }
}

/// Every piece of per-page pipeline state, wired together from a policy.
pub struct PageSession {
    doc: SharedDocument,
    scan_state: Arc<ScanStateStore>,
    feedback: Arc<FeedbackQueue>,
    renderer: Arc<AnnotationRenderer>,
    orchestrator: Arc<ScanOrchestrator>,
    connectivity: Arc<OnlineFlag>,
    bus: NotificationBus,
}

impl PageSession {
    pub fn new(
        policy: &SentinelPolicy,
        settings: ScanSettings,
        document: Document,
        ports: SessionPorts,
    ) -> Result<Self, ScanError> {
        let SessionPorts {
            classifier,
            feedback_relay,
            store,
            connectivity,
            bus,
        } = ports;
        let doc = shared(document);
        let segmenter = Arc::new(Segmenter::new(&segmenter_config(&policy.scan))?);
        let scan_state = Arc::new(ScanStateStore::new(Arc::clone(&segmenter)));
        let feedback = FeedbackQueue::new(
            FeedbackConfig::from_policy(&policy.feedback),
            feedback_relay,
            store,
            connectivity.clone(),
            bus.clone(),
        );
        let renderer = AnnotationRenderer::new(
            doc.clone(),
            RendererConfig::from_policy(&policy.overlay),
            Arc::clone(&feedback),
            Arc::clone(&scan_state),
        );
        let orchestrator = ScanOrchestrator::new(
            doc.clone(),
            segmenter,
            Arc::clone(&scan_state),
            Arc::clone(&renderer),
            classifier,
            bus.clone(),
            ScanConfig::new(settings, &policy.scan),
        );
        Ok(Self {
            doc,
            scan_state,
            feedback,
            renderer,
            orchestrator,
            connectivity,
            bus,
        })
    }

    pub fn document(&self) -> &SharedDocument {
        &self.doc
    }

    pub fn scan_state(&self) -> &Arc<ScanStateStore> {
        &self.scan_state
    }

    pub fn feedback(&self) -> &Arc<FeedbackQueue> {
        &self.feedback
    }

    pub fn renderer(&self) -> &Arc<AnnotationRenderer> {
        &self.renderer
    }

    pub fn orchestrator(&self) -> &Arc<ScanOrchestrator> {
        &self.orchestrator
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Restores the persisted feedback backlog, then runs the startup sweep and
    /// follows `feed`.
    pub async fn start<F>(&self, feed: F) -> Result<ScanSummary, ScanError>
    where
        F: ChangeFeed + 'static,
    {
        let pending = self.feedback.initialize().await;
        debug!(target: "scan.orchestrator", pending, "feedback backlog restored");
        self.orchestrator.start(feed).await
    }

    /// Host connectivity transition; going online flushes queued feedback.
    pub fn set_online(&self, online: bool) {
        if self.connectivity.set_online(online) {
            self.feedback.on_online();
        }
    }

    pub async fn activate(&self, control: NodeId) -> Result<ControlOutcome, RenderError> {
        self.renderer.activate(control).await
    }

    pub fn on_viewport_change(&self, viewport: Viewport) {
        self.renderer.on_viewport_change(viewport);
    }

    pub fn stop(&self, reason: Option<&str>, reset_highlights: bool) {
        self.orchestrator.stop(reason, reset_highlights);
    }

    /// Cancels every timer owned by the session.
    pub fn shutdown(&self) {
        self.renderer.shutdown();
        self.feedback.shutdown();
    }
}
