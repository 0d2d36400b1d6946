use tokio::sync::broadcast;

use super::traits::{AppEvent, EventBus, EventFilter};

const DEFAULT_CAPACITY: usize = 1024;

/// [`EventBus`] backed by a `tokio::sync::broadcast` channel.
pub struct TokioBroadcastBus {
    sender: broadcast::Sender<AppEvent>,
}

impl TokioBroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: AppEvent) -> Result<(), String> {
        // 0 active receivers is fine; the event is simply dropped.
        self.sender.send(event).map(|_| ()).map_err(|e| e.to_string())
    }

    fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    fn subscribe_filtered(&self, _filter: EventFilter) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx = bus.subscribe();

        bus.publish(AppEvent::Heartbeat(serde_json::json!({"galla": 1}))).unwrap();

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, AppEvent::Heartbeat(_)));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(AppEvent::Growth(serde_json::json!({"kind": "restart"}))).unwrap();

        assert!(matches!(rx1.recv().await.unwrap(), AppEvent::Growth(_)));
        assert!(matches!(rx2.recv().await.unwrap(), AppEvent::Growth(_)));
    }

    #[tokio::test]
    async fn lagged_receiver_reports_error() {
        let bus = TokioBroadcastBus::with_capacity(1);
        let mut slow_rx = bus.subscribe();

        bus.publish(AppEvent::Chat(serde_json::json!({"n": 1}))).unwrap();
        bus.publish(AppEvent::Chat(serde_json::json!({"n": 2}))).unwrap();

        let result = slow_rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
