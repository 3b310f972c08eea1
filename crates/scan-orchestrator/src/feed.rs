use async_trait::async_trait;
use tokio::sync::mpsc;

use page_dom::NodeId;

/// Source of DOM subtree additions, one batch per observed mutation record set.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Next batch of added nodes, or `None` once the host stops observing.
    async fn next_batch(&mut self) -> Option<Vec<NodeId>>;
}

#[async_trait]
impl ChangeFeed for mpsc::Receiver<Vec<NodeId>> {
    async fn next_batch(&mut self) -> Option<Vec<NodeId>> {
        self.recv().await
    }
}

#[async_trait]
impl ChangeFeed for mpsc::UnboundedReceiver<Vec<NodeId>> {
    async fn next_batch(&mut self) -> Option<Vec<NodeId>> {
        self.recv().await
    }
}

/// Feed that never yields; used when a host only wants the startup sweep.
#[derive(Debug, Default)]
pub struct NoChanges;

#[async_trait]
impl ChangeFeed for NoChanges {
    async fn next_batch(&mut self) -> Option<Vec<NodeId>> {
        None
    }
}

/// Bounded channel whose receiver is a [`ChangeFeed`].
pub fn change_channel(
    capacity: usize,
) -> (mpsc::Sender<Vec<NodeId>>, mpsc::Receiver<Vec<NodeId>>) {
    mpsc::channel(capacity.max(1))
}
