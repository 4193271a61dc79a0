//! Fire-and-forget event publication.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::CallbackConfig;
use crate::dispatcher::CallbackDispatcher;
use crate::event::CallbackEvent;

/// Accepts events from producers.
///
/// Publishing never fails from the producer's point of view; delivery
/// problems are the publisher's to log.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: CallbackEvent);
}

/// Publishes events to every configured webhook endpoint.
///
/// Each event is delivered on its own task so producers never wait on
/// receivers or backoff sleeps.
#[derive(Debug, Clone)]
pub struct CallbackPublisher {
    dispatcher: CallbackDispatcher,
    configs: Arc<Vec<CallbackConfig>>,
    shutdown: CancellationToken,
}

impl CallbackPublisher {
    /// Creates a publisher. Cancelling `shutdown` stops pending retries.
    pub fn new(
        dispatcher: CallbackDispatcher,
        configs: Vec<CallbackConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            configs: Arc::new(configs),
            shutdown,
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.configs.len()
    }
}

#[async_trait]
impl EventPublisher for CallbackPublisher {
    async fn publish(&self, event: CallbackEvent) {
        if self.configs.is_empty() {
            tracing::debug!(event_id = %event.event_id, key = %event.key(), "no callback endpoints configured");
            return;
        }

        let dispatcher = self.dispatcher.clone();
        let configs = Arc::clone(&self.configs);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let results = dispatcher.dispatch(&shutdown, &configs, &event).await;
            for (config, result) in configs.iter().zip(results) {
                if let Err(e) = result {
                    tracing::error!(url = %config.url, event_id = %event.event_id, error = %e, "callback not delivered");
                }
            }
        });
    }
}

/// Records published events in memory, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events in publication order.
    pub async fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().await.clone()
    }

    /// Published events with the given type and action.
    pub async fn events_of(&self, event_type: &str, action: &str) -> Vec<CallbackEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type == event_type && e.action == action)
            .cloned()
            .collect()
    }

    pub async fn event_count(&self) -> usize {
        self.events.lock().await.len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: CallbackEvent) {
        self.events.lock().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProjectId;

    #[tokio::test]
    async fn test_in_memory_publisher_records_events() {
        let publisher = InMemoryEventPublisher::new();
        let project_id = ProjectId::new();

        publisher
            .publish(CallbackEvent::project_event("created", project_id, &()).unwrap())
            .await;
        publisher
            .publish(CallbackEvent::transaction_event("cancelled", project_id, &()).unwrap())
            .await;

        assert_eq!(publisher.event_count().await, 2);
        assert_eq!(publisher.events_of("transaction", "cancelled").await.len(), 1);
        assert!(publisher.events_of("project", "deleted").await.is_empty());
    }

    #[tokio::test]
    async fn test_callback_publisher_without_endpoints_is_noop() {
        let publisher = CallbackPublisher::new(
            CallbackDispatcher::new().unwrap(),
            Vec::new(),
            CancellationToken::new(),
        );
        assert_eq!(publisher.endpoint_count(), 0);
        publisher
            .publish(CallbackEvent::project_event("created", ProjectId::new(), &()).unwrap())
            .await;
    }
}
