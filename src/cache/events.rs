//! Cache Events Module
//!
//! Change notifications published by [`crate::cache::VeloxCache`].

use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the per-cache event channel. Slow subscribers lag and
/// skip events rather than blocking writers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Kind of transition a cache went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Hit,
    Miss,
    Put,
    Removed,
    Evicted,
    Expired,
    Stale,
    Cleared,
}

// == Cache Event ==
/// A single cache transition. `key` is None only for `Cleared`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub key: Option<String>,
}

impl CacheEvent {
    pub fn keyed(kind: CacheEventKind, key: &str) -> Self {
        Self {
            kind,
            key: Some(key.to_string()),
        }
    }

    pub fn cleared() -> Self {
        Self {
            kind: CacheEventKind::Cleared,
            key: None,
        }
    }
}

// == Event Bus ==
/// Fire-and-forget broadcaster. Every subscriber receives every event
/// published after it subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Publishes `event`. Having no subscribers is not an error.
    pub fn publish(&self, event: CacheEvent) {
        let _ = self.sender.send(event);
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

    #[tokio::test]
    async fn test_every_subscriber_receives_every_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(CacheEvent::keyed(CacheEventKind::Put, "k"));
        bus.publish(CacheEvent::cleared());

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await.unwrap(),
                CacheEvent::keyed(CacheEventKind::Put, "k")
            );
            assert_eq!(rx.recv().await.unwrap().kind, CacheEventKind::Cleared);
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(CacheEvent::cleared());

        // Late subscribers only see later events
        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
        bus.publish(CacheEvent::keyed(CacheEventKind::Removed, "k"));
        assert_eq!(late.try_recv().unwrap().kind, CacheEventKind::Removed);
    }
}
