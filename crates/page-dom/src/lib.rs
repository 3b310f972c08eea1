//! Arena document model used by the scan pipeline in place of a live browser DOM.

pub mod css;
mod document;
pub mod errors;
mod html;
mod node;

use std::sync::Arc;

use parking_lot::Mutex;

pub use css::SelectorList;
pub use document::Document;
pub use errors::{DomError, SelectorError};
pub use node::{ElementData, NodeData, NodeId, Rect, TextSlice, Viewport};

/// Document handle shared between the pipeline components of one page session.
///
/// Callers lock for short synchronous sections only and never hold the guard across `.await`.
pub type SharedDocument = Arc<Mutex<Document>>;

pub fn shared(document: Document) -> SharedDocument {
    Arc::new(Mutex::new(document))
}
