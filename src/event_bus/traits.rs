//! Typed events pushed over `/api/ws`: `{type, data}` envelopes
//! for chat, heartbeat, growth, memory, library, and inbox activity.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AppEvent {
    Chat(serde_json::Value),
    Heartbeat(serde_json::Value),
    Growth(serde_json::Value),
    Memory(serde_json::Value),
    Library(serde_json::Value),
    Inbox(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Chat,
    Heartbeat,
    Growth,
    Memory,
    Library,
    Inbox,
    /// Matches every variant.
    All,
}

impl EventType {
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            Self::All => true,
            Self::Chat => matches!(event, AppEvent::Chat(_)),
            Self::Heartbeat => matches!(event, AppEvent::Heartbeat(_)),
            Self::Growth => matches!(event, AppEvent::Growth(_)),
            Self::Memory => matches!(event, AppEvent::Memory(_)),
            Self::Library => matches!(event, AppEvent::Library(_)),
            Self::Inbox => matches!(event, AppEvent::Inbox(_)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventFilter {
    pub event_types: Vec<EventType>,
}

impl EventFilter {
    pub fn new(event_types: Vec<EventType>) -> Self {
        Self { event_types }
    }

    pub fn matches(&self, event: &AppEvent) -> bool {
        self.event_types.iter().any(|t| t.matches(event))
    }
}

/// Central pub/sub bus for application events. All returned receivers see
/// every published event; callers filter with [`EventFilter::matches`].
pub trait EventBus: Send + Sync {
    fn publish(&self, event: AppEvent) -> Result<(), String>;
    fn subscribe(&self) -> broadcast::Receiver<AppEvent>;
    fn subscribe_filtered(&self, filter: EventFilter) -> broadcast::Receiver<AppEvent>;
}
