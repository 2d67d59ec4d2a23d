use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::types::GateEvent;

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Fan-out of [`GateEvent`]s. Emitting never blocks and never fails; events
/// with no subscriber are dropped.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GateEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: GateEvent) {
        let _ = self.sender.send(event);
    }

    /// Live event stream. Lagged receivers skip what they missed.
    pub fn subscribe(&self) -> BoxStream<GateEvent> {
        let stream = BroadcastStream::new(self.sender.subscribe())
            .filter_map(|item| async move { item.ok() });
        Box::pin(stream)
    }

    pub fn receiver(&self) -> broadcast::Receiver<GateEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
