//! Server-push event channel
//!
//! Fan-out of progress and lifecycle events to connected websocket clients.
//! Sends never block and never fail: with no subscribers the event is
//! simply dropped.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast;

/// JSON envelope pushed to clients as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(default)]
    pub payload: JsonValue,
}

impl Envelope {
    #[must_use]
    pub fn new(event: impl Into<String>, payload: JsonValue) -> Self {
        Self { event: event.into(), payload }
    }

    #[must_use]
    pub fn connected() -> Self {
        Self::new("connected", JsonValue::Null)
    }

    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new("heartbeat", JsonValue::Null)
    }

    #[must_use]
    pub fn generation_progress(
        step: &str,
        message: &str,
        current: Option<usize>,
        total: Option<usize>,
    ) -> Self {
        let mut payload = json!({ "step": step, "message": message });
        if let Some(current) = current {
            payload["current"] = json!(current);
        }
        if let Some(total) = total {
            payload["total"] = json!(total);
        }
        Self::new("generation:progress", payload)
    }

    #[must_use]
    pub fn library_synced(item_count: usize) -> Self {
        Self::new("library:synced", json!({ "items": item_count }))
    }

    #[must_use]
    pub fn channels_regenerated(channel_count: usize) -> Self {
        Self::new("channels:regenerated", json!({ "channels": channel_count }))
    }
}

/// Broadcast hub for push events.
pub struct Broadcaster {
    tx: broadcast::Sender<Envelope>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn send(&self, envelope: Envelope) {
        // No receivers is fine; the event is simply not observed.
        let _ = self.tx.send(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let envelope = Envelope::generation_progress("sync", "Fetching library", Some(3), Some(10));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "generation:progress");
        assert_eq!(json["payload"]["step"], "sync");
        assert_eq!(json["payload"]["current"], 3);
        assert_eq!(json["payload"]["total"], 10);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let hub = Broadcaster::new();
        let mut rx = hub.subscribe();
        hub.send(Envelope::library_synced(42));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, "library:synced");
        assert_eq!(received.payload["items"], 42);
    }

    #[test]
    fn send_without_subscribers_is_fine() {
        let hub = Broadcaster::new();
        hub.send(Envelope::heartbeat());
    }
}
