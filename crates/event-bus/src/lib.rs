use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use sentinel_core_types::{Notification, SentinelError};

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), SentinelError>;

    /// Fire-and-forget publish. Having no subscriber is not an error for emitters.
    fn emit(&self, event: E);

    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Bus handle shared by every pipeline component of one page session.
pub type NotificationBus = Arc<dyn EventBus<Notification>>;

/// Simple in-memory bus suitable for unit tests and a single page context.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), SentinelError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|err| SentinelError::new(err.to_string()))
    }

    fn emit(&self, event: E) {
        if let Err(err) = self.sender.send(event) {
            trace!(target: "event.bus", event = ?err.0, "notification dropped without subscribers");
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Drains everything currently buffered on a subscription without waiting.
pub fn drain<E>(rx: &mut broadcast::Receiver<E>) -> Vec<E>
where
    E: Event,
{
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}
