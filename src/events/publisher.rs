use serde_json::Value;
use tokio::sync::broadcast;

/// Lifecycle event fanned out to subscribers
#[derive(Debug, Clone)]
pub struct DirectorEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Broadcast publisher for pool and workflow lifecycle events.
///
/// Publishing never fails: with no subscribers the event is dropped, which is
/// the expected steady state when no status consumer is attached.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<DirectorEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = DirectorEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };
        // send only errors when there are no subscribers; acceptable
        let _ = self.sender.send(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<DirectorEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_reaches_subscribers() {
        tokio_test::block_on(async {
            let publisher = EventPublisher::new(8);
            let mut rx = publisher.subscribe();

            publisher.publish("session.created", json!({"pool_key": "general"}));

            let event = rx.recv().await.unwrap();
            assert_eq!(event.name, "session.created");
            assert_eq!(event.context["pool_key"], "general");
        });
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let publisher = EventPublisher::default();
        publisher.publish("workflow.started", json!({}));
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
