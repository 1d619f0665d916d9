use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the event channel. Sending never blocks; a subscriber
/// that falls more than this many events behind loses its oldest
/// events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Kind of a simulator state transition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Access,
    Fault,
    Evict,
    SwapIn,
    SwapOut,
    Ai,
    Simulation,
    Error,
}

/// A typed event published for every observable state transition. For a
/// single access the events appear in service order: AI events first,
/// then either ACCESS, or FAULT followed by the eviction/install
/// events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    /// Milliseconds since the unix epoch.
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Event {
        Event { kind, message: message.into(), timestamp_ms: now_ms(), data: None }
    }

    pub fn with_data(kind: EventKind, message: impl Into<String>, data: impl Into<String>) -> Event {
        Event { data: Some(data.into()), ..Event::new(kind, message) }
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Send half of the event channel. The VMM holds only this side; sinks
/// (the SSE adapter, tests) subscribe for receivers. The channel is
/// bounded with drop-oldest semantics for lagging subscribers, so the
/// core never waits on a slow consumer.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<Event>,
}

impl EventSender {
    pub fn new() -> EventSender {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventSender { tx }
    }

    /// Publish an event. Events published while no subscriber is
    /// connected are discarded.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventSender {
    fn default() -> Self {
        EventSender::new()
    }
}
