use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use futures_util::stream::{SelectAll, select_all};
use tokio::sync::broadcast;
use tracing::warn;

use parley_types::events::{ChatEvent, Topic};

const CHANNEL_CAPACITY: usize = 1024;

/// A cancellable stream of events; dropping it deregisters the listener.
pub type EventStream = SelectAll<Pin<Box<dyn Stream<Item = ChatEvent> + Send>>>;

/// In-process publish/subscribe bus: one broadcast channel per topic.
/// Constructed once at startup and passed through the app state — there is
/// no ambient singleton. Delivery is best-effort to listeners registered at
/// publish time: no replay, no persistence, FIFO within a topic only.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    conversation_created: broadcast::Sender<ChatEvent>,
    conversation_updated: broadcast::Sender<ChatEvent>,
    conversation_deleted: broadcast::Sender<ChatEvent>,
    message_sent: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let channel = || broadcast::channel(CHANNEL_CAPACITY).0;
        Self {
            inner: Arc::new(EventBusInner {
                conversation_created: channel(),
                conversation_updated: channel(),
                conversation_deleted: channel(),
                message_sent: channel(),
            }),
        }
    }

    /// Fire-and-forget publish on the event's own topic. Zero live
    /// subscribers is not an error.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.sender(event.topic()).send(event);
    }

    /// Merged stream over the given topics.
    pub fn subscribe(&self, topics: &[Topic]) -> EventStream {
        select_all(topics.iter().map(|&topic| self.topic_stream(topic)))
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<ChatEvent> {
        match topic {
            Topic::ConversationCreated => &self.inner.conversation_created,
            Topic::ConversationUpdated => &self.inner.conversation_updated,
            Topic::ConversationDeleted => &self.inner.conversation_deleted,
            Topic::MessageSent => &self.inner.message_sent,
        }
    }

    fn topic_stream(&self, topic: Topic) -> Pin<Box<dyn Stream<Item = ChatEvent> + Send>> {
        let mut rx = self.sender(topic).subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged by {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
