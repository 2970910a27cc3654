use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::types::OrchestratorEvent;

/// Broadcast bus for orchestration lifecycle events: dispatch start and
/// completion, per-agent call outcomes, health transitions, report
/// finalization. Keeps a bounded in-memory history for inspection.
pub struct EventBus {
    event_sender: broadcast::Sender<OrchestratorEvent>,
    event_history: Arc<RwLock<Vec<OrchestratorEvent>>>,
}

const HISTORY_LIMIT: usize = 10_000;

impl EventBus {
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(1024);

        Self {
            event_sender,
            event_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Publish an event to all subscribers and record it in history.
    pub async fn publish(&self, source: &str, event_type: &str, data: serde_json::Value) {
        let event = OrchestratorEvent {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            source: source.to_string(),
            event_type: event_type.to_string(),
            data,
        };

        debug!(source, event_type, "publishing event");

        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());
            if history.len() > HISTORY_LIMIT {
                history.drain(0..HISTORY_LIMIT / 10);
            }
        }

        // A send error only means there are no active subscribers.
        let _ = self.event_sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_sender.receiver_count()
    }

    /// Event history filtered by source and/or event type, most recent last.
    pub async fn history(
        &self,
        source: Option<&str>,
        event_type: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<OrchestratorEvent> {
        let history = self.event_history.read().await;

        let filtered: Vec<OrchestratorEvent> = history
            .iter()
            .filter(|event| {
                if let Some(s) = source {
                    if event.source != s {
                        return false;
                    }
                }
                if let Some(t) = event_type {
                    if event.event_type != t {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        match limit {
            Some(limit) if filtered.len() > limit => {
                filtered[filtered.len() - limit..].to_vec()
            }
            _ => filtered,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish("dispatcher", "dispatch_started", json!({"work_unit": "wu-1"}))
            .await;

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.source, "dispatcher");
        assert_eq!(event.event_type, "dispatch_started");
        assert_eq!(event.data["work_unit"], "wu-1");
    }

    #[tokio::test]
    async fn history_filters_by_source_and_type() {
        let bus = EventBus::new();
        bus.publish("dispatcher", "dispatch_started", json!({})).await;
        bus.publish("health", "agent_status_changed", json!({})).await;
        bus.publish("dispatcher", "agent_call_completed", json!({})).await;

        assert_eq!(bus.history(None, None, None).await.len(), 3);
        assert_eq!(bus.history(Some("dispatcher"), None, None).await.len(), 2);
        assert_eq!(
            bus.history(None, Some("agent_status_changed"), None).await.len(),
            1
        );
    }

    #[tokio::test]
    async fn history_limit_keeps_most_recent() {
        let bus = EventBus::new();
        for i in 0..5 {
            bus.publish("dispatcher", "agent_call_completed", json!({"index": i}))
                .await;
        }

        let limited = bus.history(None, None, Some(2)).await;
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].data["index"], 3);
        assert_eq!(limited[1].data["index"], 4);
    }
}
