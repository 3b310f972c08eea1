use std::collections::BTreeMap;

use page_dom::{Document, NodeId};
use sentinel_core_types::HighlightStyle;

use crate::tooltip::Placement;

/// Floating tooltip or inline control strip attached for one target.
#[derive(Clone, Debug, PartialEq)]
pub enum Panel {
    Tooltip {
        container: NodeId,
        placement: Option<Placement>,
    },
    Inline {
        controls: NodeId,
        toggle: NodeId,
    },
}

impl Panel {
    pub fn node(&self) -> NodeId {
        match self {
            Panel::Tooltip { container, .. } => *container,
            Panel::Inline { controls, .. } => *controls,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    pub target: NodeId,
    pub signature: Option<String>,
    pub style: HighlightStyle,
    pub wrappers: Vec<NodeId>,
    pub panel: Panel,
    pub score: Option<f64>,
    pub score_text: String,
    pub feedback_text: String,
}

/// At most one registration per target.
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    entries: BTreeMap<NodeId, Registration>,
}

impl OverlayRegistry {
    pub fn insert(&mut self, registration: Registration) -> Option<Registration> {
        self.entries.insert(registration.target, registration)
    }

    pub fn remove(&mut self, target: NodeId) -> Option<Registration> {
        self.entries.remove(&target)
    }

    pub fn get(&self, target: NodeId) -> Option<&Registration> {
        self.entries.get(&target)
    }

    pub fn contains(&self, target: NodeId) -> bool {
        self.entries.contains_key(&target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self) -> Vec<NodeId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.entries.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Registration> {
        self.entries.values_mut()
    }

    /// Target whose panel contains `node`.
    pub fn owner_of(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        self.entries
            .values()
            .find(|registration| doc.contains(registration.panel.node(), node))
            .map(|registration| registration.target)
    }
}
