//! Scan bookkeeping for one page session: the dedup signature set and the
//! per-element scan status.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use page_dom::{Document, NodeId};
use segmenter::Segmenter;
use sentinel_core_types::SentinelError;

/// Lifecycle of a scan target.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    #[default]
    Unscanned,
    Processing,
    Processed,
    Dismissed,
}

impl ScanState {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanState::Unscanned => "unscanned",
            ScanState::Processing => "processing",
            ScanState::Processed => "processed",
            ScanState::Dismissed => "dismissed",
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Staying in the same state is allowed for every state except `Processing`.
    pub fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::*;
        matches!(
            (self, next),
            (Unscanned, Unscanned)
                | (Unscanned, Processing)
                | (Unscanned, Processed)
                | (Processing, Processed)
                | (Processing, Unscanned)
                | (Processed, Processed)
                | (Processed, Dismissed)
                | (Dismissed, Dismissed)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanStateError {
    #[error("illegal scan state transition for node {node}: {from:?} -> {to:?}")]
    InvalidTransition {
        node: NodeId,
        from: ScanState,
        to: ScanState,
    },
}

impl From<ScanStateError> for SentinelError {
    fn from(err: ScanStateError) -> Self {
        SentinelError::new(err.to_string())
    }
}

#[derive(Clone, Debug, Default)]
struct NodeRecord {
    state: ScanState,
    signature: Option<String>,
}

/// Counters describing the store at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStateSnapshot {
    pub signatures: Vec<String>,
    pub processing: usize,
    pub processed: usize,
    pub dismissed: usize,
}

/// Dedup set plus element status map, shared by the orchestrator and the renderer.
pub struct ScanStateStore {
    segmenter: Arc<Segmenter>,
    signatures: DashSet<String>,
    nodes: DashMap<NodeId, NodeRecord>,
}

impl ScanStateStore {
    pub fn new(segmenter: Arc<Segmenter>) -> Self {
        Self {
            segmenter,
            signatures: DashSet::new(),
            nodes: DashMap::new(),
        }
    }

    /// Stable signature of `target`, derived by the segmenter.
    pub fn identify(&self, doc: &Document, target: NodeId) -> String {
        self.segmenter.build_signature(doc, target)
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.signatures.contains(signature)
    }

    /// Records `signature` as known. Returns `false` when it was already present.
    pub fn claim(&self, signature: &str) -> bool {
        self.signatures.insert(signature.to_string())
    }

    pub fn release(&self, signature: &str) -> bool {
        self.signatures.remove(signature).is_some()
    }

    pub fn state(&self, node: NodeId) -> ScanState {
        self.nodes
            .get(&node)
            .map(|record| record.state)
            .unwrap_or_default()
    }

    pub fn signature_of(&self, node: NodeId) -> Option<String> {
        self.nodes
            .get(&node)
            .and_then(|record| record.signature.clone())
    }

    /// Applies a lifecycle step atomically and returns the previous state.
    pub fn transition(&self, node: NodeId, next: ScanState) -> Result<ScanState, ScanStateError> {
        self.transition_with(node, next, None)
    }

    /// Unscanned -> Processing, remembering the signature claimed for the pass.
    pub fn begin_processing(&self, node: NodeId, signature: &str) -> Result<(), ScanStateError> {
        self.transition_with(node, ScanState::Processing, Some(signature))
            .map(|_| ())
    }

    /// Marks `node` processed and records its signature in the dedup set.
    pub fn mark_processed(&self, node: NodeId, signature: &str) -> Result<(), ScanStateError> {
        self.transition_with(node, ScanState::Processed, Some(signature))?;
        self.claim(signature);
        Ok(())
    }

    /// Returns a target touched by an aborted pass to Unscanned and forgets its signature.
    pub fn revert(&self, node: NodeId) -> Result<(), ScanStateError> {
        let signature = self.signature_of(node);
        self.transition_with(node, ScanState::Unscanned, None)?;
        if let Some(signature) = signature {
            self.release(&signature);
        }
        if let Some(mut record) = self.nodes.get_mut(&node) {
            record.signature = None;
        }
        Ok(())
    }

    /// Processed -> Dismissed, evicting the signature from the dedup set.
    pub fn dismiss(&self, node: NodeId) -> Result<(), ScanStateError> {
        let signature = self.signature_of(node);
        self.transition_with(node, ScanState::Dismissed, None)?;
        if let Some(signature) = signature {
            self.release(&signature);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ScanStateSnapshot {
        let mut signatures: Vec<String> = self.signatures.iter().map(|s| s.key().clone()).collect();
        signatures.sort();
        let mut snapshot = ScanStateSnapshot {
            signatures,
            ..ScanStateSnapshot::default()
        };
        for record in self.nodes.iter() {
            match record.state {
                ScanState::Processing => snapshot.processing += 1,
                ScanState::Processed => snapshot.processed += 1,
                ScanState::Dismissed => snapshot.dismissed += 1,
                ScanState::Unscanned => {}
            }
        }
        snapshot
    }

    fn transition_with(
        &self,
        node: NodeId,
        next: ScanState,
        signature: Option<&str>,
    ) -> Result<ScanState, ScanStateError> {
        match self.nodes.entry(node) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let from = record.state;
                if !from.can_transition_to(next) {
                    return Err(ScanStateError::InvalidTransition {
                        node,
                        from,
                        to: next,
                    });
                }
                record.state = next;
                if let Some(signature) = signature {
                    record.signature = Some(signature.to_string());
                }
                trace!(target: "scan.state", %node, from = from.as_str(), to = next.as_str(), "scan state changed");
                Ok(from)
            }
            Entry::Vacant(entry) => {
                let from = ScanState::Unscanned;
                if !from.can_transition_to(next) {
                    return Err(ScanStateError::InvalidTransition {
                        node,
                        from,
                        to: next,
                    });
                }
                entry.insert(NodeRecord {
                    state: next,
                    signature: signature.map(str::to_string),
                });
                trace!(target: "scan.state", %node, to = next.as_str(), "scan state recorded");
                Ok(from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segmenter::SegmenterConfig;

    fn store() -> ScanStateStore {
        ScanStateStore::new(Arc::new(
            Segmenter::new(&SegmenterConfig::default()).unwrap(),
        ))
    }

    fn page() -> (Document, NodeId) {
        let doc = Document::from_html("https://x.com/home", "<p>You are scum.</p>").unwrap();
        let p = doc.children(doc.body())[0];
        (doc, p)
    }

    #[test]
    fn lifecycle_follows_pass_then_dismiss() {
        let store = store();
        let (doc, p) = page();
        let signature = store.identify(&doc, p);
        assert!(store.claim(&signature));
        assert!(!store.claim(&signature));

        store.begin_processing(p, &signature).unwrap();
        assert_eq!(store.state(p), ScanState::Processing);
        store.mark_processed(p, &signature).unwrap();
        assert_eq!(store.state(p), ScanState::Processed);
        assert!(store.contains(&signature));

        store.dismiss(p).unwrap();
        assert_eq!(store.state(p), ScanState::Dismissed);
        assert!(!store.contains(&signature));
    }

    #[test]
    fn dismissed_is_terminal() {
        let store = store();
        let (doc, p) = page();
        let signature = store.identify(&doc, p);
        store.mark_processed(p, &signature).unwrap();
        store.dismiss(p).unwrap();
        for next in [ScanState::Unscanned, ScanState::Processing, ScanState::Processed] {
            assert!(matches!(
                store.transition(p, next),
                Err(ScanStateError::InvalidTransition { .. })
            ));
        }
        assert_eq!(store.transition(p, ScanState::Dismissed).unwrap(), ScanState::Dismissed);
    }

    #[test]
    fn processed_cannot_restart_processing() {
        let store = store();
        let (doc, p) = page();
        store.mark_processed(p, "x.com:id:1").unwrap();
        let err = store.begin_processing(p, "x.com:id:1").unwrap_err();
        assert_eq!(
            err,
            ScanStateError::InvalidTransition {
                node: p,
                from: ScanState::Processed,
                to: ScanState::Processing,
            }
        );
        assert!(store.dismiss(doc.body()).is_err());
    }

    #[test]
    fn revert_releases_claimed_signature() {
        let store = store();
        let (doc, p) = page();
        let signature = store.identify(&doc, p);
        store.claim(&signature);
        store.begin_processing(p, &signature).unwrap();
        store.revert(p).unwrap();
        assert_eq!(store.state(p), ScanState::Unscanned);
        assert!(!store.contains(&signature));
        assert_eq!(store.signature_of(p), None);
    }

    #[test]
    fn snapshot_counts_states() {
        let store = store();
        let (doc, p) = page();
        let signature = store.identify(&doc, p);
        store.mark_processed(p, &signature).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.signatures, vec![signature]);
        assert_eq!(snapshot.processing, 0);
    }
}
