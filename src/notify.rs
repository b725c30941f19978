use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub of applied events, one channel per service.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a service's events. Creates the channel if needed.
    pub fn subscribe(&self, service_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(service_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, service_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&service_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a service's channel; receivers see the stream close.
    pub fn remove(&self, service_id: &Ulid) {
        self.channels.remove(service_id);
    }
}
