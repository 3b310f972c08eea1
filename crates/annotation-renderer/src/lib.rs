//! Turns flagged sentence spans into DOM annotations: span merging, range wrapping,
//! floating tooltips or inline reveal controls, and the feedback buttons on them.

mod controls;
pub mod merge;
mod registry;
mod renderer;
pub mod tooltip;
pub mod wrap;

use thiserror::Error;

use page_dom::{DomError, NodeId};
use sentinel_core_types::SentinelError;

pub use controls::CONTROLS_CLASS;
pub use merge::{merge_spans, FlaggedSpan};
pub use registry::{OverlayRegistry, Panel, Registration};
pub use renderer::{
    AnnotationRenderer, AttachRequest, ControlOutcome, RendererConfig, HIGHLIGHT_CLASS,
};
pub use tooltip::{tooltip_position, Placement, Verdict, TOOLTIP_CLASS};
pub use wrap::{unwrap_wrappers, wrap_range, INLINE_CLASS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("node {0} is not an annotation control")]
    UnknownControl(NodeId),
    #[error(transparent)]
    Dom(#[from] DomError),
}

impl From<RenderError> for SentinelError {
    fn from(err: RenderError) -> Self {
        SentinelError::new(err.to_string())
    }
}
