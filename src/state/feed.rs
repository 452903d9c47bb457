use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::feed::ServerEvent;

/// Simple broadcast hub wrapper carrying the events of one session.
pub struct FeedHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl FeedHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, returning how many received it.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Registry of per-session hubs, created on first subscription.
pub struct FeedHubs {
    hubs: DashMap<Uuid, FeedHub>,
    capacity: usize,
}

impl FeedHubs {
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to the events of `session_id`, creating its hub when needed.
    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.hubs
            .entry(session_id)
            .or_insert_with(|| FeedHub::new(self.capacity))
            .subscribe()
    }

    /// Publish to a single session. Hubs left without receivers are dropped.
    pub fn publish(&self, session_id: Uuid, event: ServerEvent) -> usize {
        let delivered = match self.hubs.get(&session_id) {
            Some(hub) => hub.broadcast(event),
            None => return 0,
        };

        if delivered == 0 {
            self.hubs
                .remove_if(&session_id, |_, hub| hub.receiver_count() == 0);
        }
        delivered
    }

    /// Publish the same event to every live session feed.
    pub fn publish_all(&self, event: &ServerEvent) {
        for hub in self.hubs.iter() {
            hub.broadcast(event.clone());
        }
    }

    /// Number of sessions that currently own a hub.
    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> ServerEvent {
        ServerEvent::json(name, &serde_json::json!({ "n": 1 })).unwrap()
    }

    #[tokio::test]
    async fn publish_reaches_only_the_target_session() {
        let hubs = FeedHubs::new(8);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut first_rx = hubs.subscribe(first);
        let mut second_rx = hubs.subscribe(second);

        assert_eq!(hubs.publish(first, event("message.created")), 1);

        let received = first_rx.recv().await.unwrap();
        assert_eq!(received.event, "message.created");
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn publishing_without_receivers_drops_the_hub() {
        let hubs = FeedHubs::new(8);
        let session = Uuid::new_v4();
        drop(hubs.subscribe(session));
        assert_eq!(hubs.len(), 1);

        assert_eq!(hubs.publish(session, event("session.updated")), 0);
        assert!(hubs.is_empty());
    }

    #[tokio::test]
    async fn publish_all_fans_out() {
        let hubs = FeedHubs::new(8);
        let mut a = hubs.subscribe(Uuid::new_v4());
        let mut b = hubs.subscribe(Uuid::new_v4());

        hubs.publish_all(&event("system.status"));

        assert_eq!(a.recv().await.unwrap().event, "system.status");
        assert_eq!(b.recv().await.unwrap().event, "system.status");
    }
}
