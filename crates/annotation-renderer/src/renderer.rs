use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use feedback_queue::{FeedbackAction, FeedbackQueue, FeedbackRequest, SubmitOutcome};
use page_dom::{Document, NodeId, SharedDocument, Viewport};
use scan_state::ScanStateStore;
use segmenter::sanitize_text;
use sentinel_core_types::{HighlightStyle, HATE_LABEL};
use sentinel_policy_center::OverlayPolicy;

use crate::controls::{build_controls, group_wrappers, toggle_reveal};
use crate::merge::{merge_spans, FlaggedSpan};
use crate::registry::{OverlayRegistry, Panel, Registration};
use crate::tooltip::{apply_placement, build_tooltip, format_score, tooltip_position, Verdict};
use crate::wrap::{unwrap_wrappers, wrap_range, INLINE_CLASS};
use crate::RenderError;

pub const HIGHLIGHT_CLASS: &str = "sentinel-highlight";

#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    pub frame_interval: Duration,
    pub tooltip_gap: f64,
    pub viewport_margin: f64,
    /// Used when the host has not reported a box for the tooltip itself.
    pub tooltip_size: (f64, f64),
}

impl RendererConfig {
    pub fn from_policy(policy: &OverlayPolicy) -> Self {
        Self {
            frame_interval: Duration::from_millis(policy.frame_interval_ms.max(1)),
            tooltip_gap: policy.tooltip_gap_px,
            viewport_margin: policy.viewport_margin_px,
            tooltip_size: (240.0, 64.0),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::from_policy(&sentinel_policy_center::default_policy().overlay)
    }
}

/// Everything needed to attach feedback UI to an already wrapped target.
#[derive(Clone, Debug)]
pub struct AttachRequest {
    pub target: NodeId,
    pub verdict: Verdict,
    pub wrappers: Vec<NodeId>,
    pub snippets: Vec<String>,
    pub style: HighlightStyle,
    pub signature: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ControlAction {
    Toggle,
    Dismiss,
    Flag,
}

/// What a click on an annotation control led to.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlOutcome {
    Toggled { revealed: bool },
    Dismissed,
    Sent,
    Queued,
    Failed { message: String },
    Ignored,
}

/// Owns the overlay registry and every DOM change made for annotations.
///
/// Synchronous methods take the document explicitly so callers that already hold the
/// page lock can use them; async ones lock [`SharedDocument`] themselves and never hold
/// it across an await.
pub struct AnnotationRenderer {
    doc: SharedDocument,
    config: RendererConfig,
    registry: Mutex<OverlayRegistry>,
    feedback: Arc<FeedbackQueue>,
    scan_state: Arc<ScanStateStore>,
    listening: AtomicBool,
    frame_queued: AtomicBool,
    frame_task: Mutex<Option<JoinHandle<()>>>,
}

impl AnnotationRenderer {
    pub fn new(
        doc: SharedDocument,
        config: RendererConfig,
        feedback: Arc<FeedbackQueue>,
        scan_state: Arc<ScanStateStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            doc,
            config,
            registry: Mutex::new(OverlayRegistry::default()),
            feedback,
            scan_state,
            listening: AtomicBool::new(false),
            frame_queued: AtomicBool::new(false),
            frame_task: Mutex::new(None),
        })
    }

    pub fn document(&self) -> &SharedDocument {
        &self.doc
    }

    pub fn registration(&self, target: NodeId) -> Option<Registration> {
        self.registry.lock().get(target).cloned()
    }

    pub fn annotated_targets(&self) -> Vec<NodeId> {
        self.registry.lock().targets()
    }

    /// Whether scroll/resize notifications currently trigger repositioning.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_queued.load(Ordering::SeqCst)
    }

    /// Replaces any annotation on `target` with wrappers for the merged `spans`.
    /// Returns how many spans were wrapped.
    pub fn annotate(
        self: &Arc<Self>,
        doc: &mut Document,
        target: NodeId,
        signature: Option<&str>,
        spans: Vec<FlaggedSpan>,
        style: HighlightStyle,
    ) -> usize {
        let spans = merge_spans(spans);
        self.remove_highlight(doc, target);

        let mut wrappers = Vec::new();
        let mut snippets = Vec::new();
        let mut max_score = 0.0_f64;
        for span in &spans {
            let Some(wrapper) = wrap_range(doc, target, span.start, span.end, style) else {
                continue;
            };
            wrappers.push(wrapper);
            snippets.push(span.text.clone());
            max_score = max_score.max(span.score);
        }
        if wrappers.is_empty() {
            return 0;
        }

        let label = spans
            .first()
            .map(|span| span.label.clone())
            .unwrap_or_else(|| HATE_LABEL.to_string());
        let count = if style.conceals() {
            spans.len()
        } else {
            wrappers.len()
        };
        let wrapped = wrappers.len();
        let request = AttachRequest {
            target,
            verdict: Verdict {
                label,
                score: Some(max_score),
                count,
            },
            wrappers: wrappers.clone(),
            snippets,
            style,
            signature: signature.map(str::to_string),
        };
        if let Err(err) = self.attach(doc, request) {
            warn!(target: "scan.renderer", %target, error = %err, "failed to attach feedback controls");
            unwrap_wrappers(doc, &wrappers);
            return 0;
        }
        debug!(target: "scan.renderer", %target, wrapped, style = style.as_str(), "annotation attached");
        wrapped
    }

    /// Registers `request.target`, tearing down any previous registration first.
    /// Concealing styles without wrappers attach nothing and return `false`.
    pub fn attach(
        self: &Arc<Self>,
        doc: &mut Document,
        request: AttachRequest,
    ) -> Result<bool, RenderError> {
        let AttachRequest {
            target,
            verdict,
            wrappers,
            snippets,
            style,
            signature,
        } = request;
        let previous = self.registry.lock().remove(target);
        if let Some(previous) = previous {
            teardown(doc, &previous);
        }

        let score_text = format_score(verdict.score);
        let fallback_text = sanitize_text(&doc.text_content(target));
        let feedback_text = if snippets.is_empty() {
            fallback_text.clone()
        } else {
            snippets.join(" ")
        };

        let (panel, wrappers) = if style.conceals() {
            if wrappers.is_empty() {
                return Ok(false);
            }
            let snippets = if snippets.is_empty() {
                vec![fallback_text]
            } else {
                snippets
            };
            let groups = group_wrappers(doc, &wrappers, &snippets, style)?;
            let wrappers: Vec<NodeId> = groups.concat();
            let controls = build_controls(doc, &wrappers, &score_text)?;
            let anchor = groups
                .last()
                .and_then(|group| group.first())
                .copied()
                .filter(|anchor| doc.parent(*anchor).is_some());
            match anchor {
                Some(anchor) => doc.insert_after(anchor, controls.root)?,
                None => doc.append_child(target, controls.root)?,
            }
            (
                Panel::Inline {
                    controls: controls.root,
                    toggle: controls.toggle,
                },
                wrappers,
            )
        } else {
            let container = build_tooltip(doc, &verdict, &score_text)?;
            let body = doc.body();
            doc.append_child(body, container)?;
            doc.set_attr(target, "data-sentinel-feedback", "true")?;
            (
                Panel::Tooltip {
                    container,
                    placement: None,
                },
                wrappers,
            )
        };

        doc.add_class(target, HIGHLIGHT_CLASS)?;
        self.registry.lock().insert(Registration {
            target,
            signature,
            style,
            wrappers,
            panel,
            score: verdict.score,
            score_text,
            feedback_text,
        });
        self.schedule_update();
        Ok(true)
    }

    /// Unwraps every annotation on `target` and removes its panel.
    pub fn remove_highlight(self: &Arc<Self>, doc: &mut Document, target: NodeId) {
        if doc.is_element(target) {
            let _ = doc.remove_class(target, HIGHLIGHT_CLASS);
            let _ = doc.remove_attr(target, "data-sentinel-feedback");
        }
        let registration = self.registry.lock().remove(target);
        match registration {
            Some(registration) => {
                teardown(doc, &registration);
                self.schedule_update();
            }
            None => {
                let stray: Vec<NodeId> = doc
                    .descendants(target)
                    .into_iter()
                    .filter(|node| doc.has_class(*node, INLINE_CLASS))
                    .collect();
                unwrap_wrappers(doc, &stray);
            }
        }
    }

    pub fn clear_all(self: &Arc<Self>, doc: &mut Document) {
        let targets = self.annotated_targets();
        for target in targets {
            self.remove_highlight(doc, target);
        }
    }

    /// Handles a click on an annotation control. `control` may be the button itself or
    /// any node inside it.
    pub async fn activate(self: &Arc<Self>, control: NodeId) -> Result<ControlOutcome, RenderError> {
        let (button, action, registration, original_label) = {
            let mut doc = self.doc.lock();
            let (button, action) =
                resolve_control(&doc, control).ok_or(RenderError::UnknownControl(control))?;
            let registration = {
                let registry = self.registry.lock();
                registry
                    .owner_of(&doc, button)
                    .and_then(|target| registry.get(target).cloned())
            }
            .ok_or(RenderError::UnknownControl(control))?;

            if action == ControlAction::Toggle {
                let Panel::Inline { toggle, .. } = registration.panel else {
                    return Err(RenderError::UnknownControl(control));
                };
                let revealed = toggle_reveal(
                    &mut doc,
                    &registration.wrappers,
                    toggle,
                    &registration.score_text,
                )?;
                return Ok(ControlOutcome::Toggled { revealed });
            }
            if doc.attr(button, "disabled").is_some() {
                return Ok(ControlOutcome::Ignored);
            }
            doc.set_attr(button, "disabled", "")?;
            let pending = if action == ControlAction::Dismiss {
                "Removing…"
            } else {
                "Sending…"
            };
            let original = doc.text_content(button);
            doc.replace_children_with_text(button, pending)?;
            (button, action, registration, original)
        };

        let feedback_action = match action {
            ControlAction::Dismiss => FeedbackAction::Dismiss,
            _ => FeedbackAction::Flag,
        };
        let outcome = self
            .feedback
            .submit(FeedbackRequest {
                action: feedback_action,
                signature: registration.signature.clone(),
                text: registration.feedback_text.clone(),
                score: registration.score,
            })
            .await;

        let mut doc = self.doc.lock();
        let result = match outcome {
            SubmitOutcome::Sent { .. } if feedback_action == FeedbackAction::Dismiss => {
                let target = registration.target;
                if let Err(err) = self.scan_state.dismiss(target) {
                    warn!(target: "scan.renderer", %target, error = %err, "dismissed target was not marked processed");
                }
                if let Some(signature) = registration.signature.as_deref() {
                    self.scan_state.release(signature);
                }
                self.remove_highlight(&mut doc, target);
                doc.replace_children_with_text(button, "Removed")?;
                ControlOutcome::Dismissed
            }
            SubmitOutcome::Sent { .. } => {
                doc.replace_children_with_text(button, "Sent")?;
                ControlOutcome::Sent
            }
            SubmitOutcome::Queued { .. } => {
                doc.replace_children_with_text(button, "Queued")?;
                ControlOutcome::Queued
            }
            SubmitOutcome::Failed { message, .. } => {
                doc.remove_attr(button, "disabled")?;
                let label = if original_label.is_empty() {
                    "Retry"
                } else {
                    original_label.as_str()
                };
                doc.replace_children_with_text(button, label)?;
                ControlOutcome::Failed { message }
            }
        };
        trace!(target: "scan.renderer", ?result, "control handled");
        Ok(result)
    }

    /// Host hook for scroll and resize.
    pub fn on_viewport_change(self: &Arc<Self>, viewport: Viewport) {
        self.doc.lock().set_viewport(viewport);
        if self.is_listening() {
            self.schedule_update();
        }
    }

    /// Queues one repositioning frame for the whole registry unless one is already queued.
    pub fn schedule_update(self: &Arc<Self>) {
        if self.registry.lock().is_empty() {
            self.listening.store(false, Ordering::SeqCst);
            return;
        }
        self.listening.store(true, Ordering::SeqCst);
        if self.frame_queued.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            self.frame_queued.store(false, Ordering::SeqCst);
            trace!(target: "scan.renderer", "no runtime, frame not scheduled");
            return;
        };
        let renderer = Arc::clone(self);
        let interval = self.config.frame_interval;
        let handle = runtime.spawn(async move {
            sleep(interval).await;
            renderer.frame_queued.store(false, Ordering::SeqCst);
            let mut doc = renderer.doc.lock();
            renderer.update_positions(&mut doc);
        });
        *self.frame_task.lock() = Some(handle);
    }

    /// Runs one frame: drops registrations whose target left the document and positions
    /// every tooltip.
    pub fn update_positions(&self, doc: &mut Document) {
        let viewport = doc.viewport();
        let mut registry = self.registry.lock();
        let mut departed = Vec::new();
        for registration in registry.iter_mut() {
            if !doc.is_connected(registration.target) {
                departed.push(registration.target);
                continue;
            }
            let Panel::Tooltip {
                container,
                placement,
            } = &mut registration.panel
            else {
                continue;
            };
            let size = doc
                .rect(*container)
                .filter(|rect| !rect.is_empty())
                .map(|rect| (rect.width, rect.height))
                .unwrap_or(self.config.tooltip_size);
            *placement = tooltip_position(
                doc.rect(registration.target),
                viewport,
                size,
                self.config.tooltip_gap,
                self.config.viewport_margin,
            );
            if let Err(err) = apply_placement(doc, *container, *placement) {
                trace!(target: "scan.renderer", error = %err, "tooltip placement skipped");
            }
        }
        for target in departed {
            if let Some(registration) = registry.remove(target) {
                let _ = doc.detach(registration.panel.node());
                trace!(target: "scan.renderer", %target, "target left the document");
            }
        }
        if registry.is_empty() {
            self.listening.store(false, Ordering::SeqCst);
        }
    }

    /// Cancels a queued frame.
    pub fn shutdown(&self) {
        if let Some(handle) = self.frame_task.lock().take() {
            handle.abort();
        }
        self.frame_queued.store(false, Ordering::SeqCst);
    }
}

fn teardown(doc: &mut Document, registration: &Registration) {
    unwrap_wrappers(doc, &registration.wrappers);
    let _ = doc.detach(registration.panel.node());
}

fn resolve_control(doc: &Document, node: NodeId) -> Option<(NodeId, ControlAction)> {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .find_map(|candidate| {
            let action = match doc.attr(candidate, "data-action")? {
                "toggle" => ControlAction::Toggle,
                "dismiss" => ControlAction::Dismiss,
                "flag" => ControlAction::Flag,
                _ => return None,
            };
            Some((candidate, action))
        })
}
