//! Event Bus
//!
//! In-memory publish/subscribe between producers (stroke relay, analysis
//! coordinator) and the per-connection write loops.
//!
//! ## Delivery
//!
//! Every subscriber owns a FIFO queue, so events published by one source are
//! seen in publish order by every subscriber. Nothing orders events across
//! sources.
//!
//! - **Droppable** events (drawing deltas) are bounded per subscriber; when the
//!   bound is hit the oldest queued droppable event is evicted.
//! - **Critical** events (analysis results, clears, stroke ends) are never
//!   evicted. A subscriber that lets them pile up past the critical bound is
//!   considered dead and its queue is closed, which ends its connection.
//!
//! - **Replay** events (canvas catch-up sent to one client) are never evicted
//!   and do not count against the critical bound, since their number is set
//!   by the size of the canvas rather than by how far behind the client is.
//!
//! Publishing only enqueues. It never awaits and never touches a socket.

mod queue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use queue::{PushOutcome, SubscriberQueue};

use crate::session::ClientId;
use crate::websocket::ServerMessage;

/// Delivery class of a bus event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// May be evicted when the subscriber falls behind
    Droppable,
    /// Delivered until the subscriber disconnects
    Critical,
    /// Canvas catch-up for one client; never evicted and not counted
    /// against the critical bound
    Replay,
}

/// Message travelling through the bus
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub message: ServerMessage,
    pub delivery: Delivery,
    /// Client whose action produced the event, if any
    pub source: Option<ClientId>,
}

impl BusEvent {
    pub fn droppable(message: ServerMessage) -> Self {
        Self {
            message,
            delivery: Delivery::Droppable,
            source: None,
        }
    }

    pub fn critical(message: ServerMessage) -> Self {
        Self {
            message,
            delivery: Delivery::Critical,
            source: None,
        }
    }

    pub fn replay(message: ServerMessage) -> Self {
        Self {
            message,
            delivery: Delivery::Replay,
            source: None,
        }
    }

    pub fn from_client(mut self, source: ClientId) -> Self {
        self.source = Some(source);
        self
    }
}

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Droppable events buffered per subscriber
    pub droppable_queue_size: usize,
    /// Undelivered critical events tolerated per subscriber
    pub critical_queue_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            droppable_queue_size: 512,
            critical_queue_size: 4096,
        }
    }
}

/// Snapshot of bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub evicted_subscribers: u64,
    pub subscribers: usize,
}

#[derive(Default)]
struct AtomicBusStats {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    evicted_subscribers: AtomicU64,
}

/// Receiving end of a subscriber queue, owned by the connection's write loop
pub struct Subscription {
    client_id: ClientId,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Wait for the next event destined for this client.
    ///
    /// Returns `None` once the subscription has been closed, either by
    /// `unsubscribe` or because the client fell too far behind.
    pub async fn recv(&self) -> Option<Arc<BusEvent>> {
        self.queue.recv().await
    }

    /// Events waiting to be written
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Fan-out hub for all connected clients
pub struct EventBus {
    subscribers: RwLock<HashMap<ClientId, Arc<SubscriberQueue>>>,
    config: BusConfig,
    stats: AtomicBusStats,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            config,
            stats: AtomicBusStats::default(),
        }
    }

    /// Create the queue for a client.
    ///
    /// Only events published after this call are delivered to it. A previous
    /// subscription for the same id is closed.
    pub fn subscribe(&self, client_id: ClientId) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(
            self.config.droppable_queue_size,
            self.config.critical_queue_size,
        ));

        let previous = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id, Arc::clone(&queue));
        if let Some(previous) = previous {
            previous.close();
        }

        tracing::debug!(client_id = %client_id, "Subscribed to event bus");
        Subscription { client_id, queue }
    }

    /// Close and remove a client's queue; no-op if absent
    pub fn unsubscribe(&self, client_id: ClientId) {
        let queue = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&client_id);

        if let Some(queue) = queue {
            queue.close();
            tracing::debug!(client_id = %client_id, "Unsubscribed from event bus");
        }
    }

    /// Deliver an event to every subscriber except `exclude`.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: BusEvent, exclude: Option<ClientId>) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut dropped = 0;
        let mut overflowed = Vec::new();

        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            for (id, queue) in subscribers.iter() {
                if Some(*id) == exclude {
                    continue;
                }
                match queue.push(Arc::clone(&event)) {
                    PushOutcome::Queued => delivered += 1,
                    PushOutcome::QueuedWithDrop => {
                        delivered += 1;
                        dropped += 1;
                    }
                    PushOutcome::Overflow => overflowed.push((*id, Arc::clone(queue))),
                    PushOutcome::Closed => {}
                }
            }
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        self.stats
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        if dropped > 0 {
            self.stats.dropped.fetch_add(dropped, Ordering::Relaxed);
            tracing::debug!(dropped, "Dropped stale drawing events for slow subscribers");
        }
        for (id, queue) in overflowed {
            self.evict(id, &queue);
        }

        tracing::trace!(subscribers = delivered, "Published event");
        delivered
    }

    /// Queue an event for a single subscriber
    pub fn send_to(&self, client_id: ClientId, event: BusEvent) -> bool {
        let queue = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client_id)
            .cloned();

        let Some(queue) = queue else {
            return false;
        };

        match queue.push(Arc::new(event)) {
            PushOutcome::Queued => true,
            PushOutcome::QueuedWithDrop => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            PushOutcome::Overflow => {
                self.evict(client_id, &queue);
                false
            }
            PushOutcome::Closed => false,
        }
    }

    /// Remove `queue` if it is still the one registered for `client_id`
    fn evict(&self, client_id: ClientId, queue: &Arc<SubscriberQueue>) {
        {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(&client_id) {
                Some(current) if Arc::ptr_eq(current, queue) => {
                    subscribers.remove(&client_id);
                }
                _ => return,
            }
        }
        self.stats
            .evicted_subscribers
            .fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            client_id = %client_id,
            limit = self.config.critical_queue_size,
            "Subscriber fell too far behind, closing its queue"
        );
    }

    pub fn is_subscribed(&self, client_id: ClientId) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&client_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.stats.published.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            evicted_subscribers: self.stats.evicted_subscribers.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(text: &str) -> ServerMessage {
        ServerMessage::Error {
            message: text.to_string(),
        }
    }

    fn text(event: &BusEvent) -> &str {
        match &event.message {
            ServerMessage::Error { message } => message,
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_excludes_originator() {
        let bus = EventBus::default();
        let a = ClientId::new(1);
        let b = ClientId::new(2);
        let c = ClientId::new(3);
        let sub_a = bus.subscribe(a);
        let sub_b = bus.subscribe(b);
        let sub_c = bus.subscribe(c);

        let delivered = bus.publish(BusEvent::droppable(note("hello")).from_client(a), Some(a));
        assert_eq!(delivered, 2);

        assert_eq!(sub_a.pending(), 0);
        assert_eq!(sub_b.pending(), 1);
        assert_eq!(sub_c.pending(), 1);
        assert_eq!(text(&sub_b.recv().await.unwrap()), "hello");
        assert_eq!(text(&sub_c.recv().await.unwrap()), "hello");
    }

    #[tokio::test]
    async fn test_publish_without_exclusion_reaches_everyone() {
        let bus = EventBus::default();
        let subs: Vec<_> = (1..=3).map(|i| bus.subscribe(ClientId::new(i))).collect();

        assert_eq!(bus.publish(BusEvent::critical(note("result")), None), 3);
        for sub in &subs {
            assert_eq!(sub.pending(), 1);
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_history() {
        let bus = EventBus::default();
        let _early = bus.subscribe(ClientId::new(1));
        bus.publish(BusEvent::critical(note("before")), None);

        let late = bus.subscribe(ClientId::new(2));
        bus.publish(BusEvent::critical(note("after")), None);

        assert_eq!(late.pending(), 1);
        assert_eq!(text(&late.recv().await.unwrap()), "after");
    }

    #[tokio::test]
    async fn test_per_source_order_preserved() {
        let bus = EventBus::default();
        let a = ClientId::new(1);
        let sub_b = bus.subscribe(ClientId::new(2));

        for i in 0..50 {
            bus.publish(
                BusEvent::droppable(note(&format!("seg-{}", i))).from_client(a),
                Some(a),
            );
        }

        for i in 0..50 {
            let event = sub_b.recv().await.unwrap();
            assert_eq!(text(&event), format!("seg-{}", i));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_drawings_keeps_results() {
        let bus = EventBus::new(BusConfig {
            droppable_queue_size: 4,
            critical_queue_size: 64,
        });
        let sub = bus.subscribe(ClientId::new(1));

        for i in 0..10 {
            bus.publish(BusEvent::droppable(note(&format!("seg-{}", i))), None);
        }
        bus.publish(BusEvent::critical(note("result")), None);

        assert_eq!(sub.pending(), 5);
        assert_eq!(bus.stats().dropped, 6);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(text(&sub.recv().await.unwrap()).to_string());
        }
        assert_eq!(seen, vec!["seg-6", "seg-7", "seg-8", "seg-9", "result"]);
    }

    #[tokio::test]
    async fn test_critical_overflow_evicts_subscriber() {
        let bus = EventBus::new(BusConfig {
            droppable_queue_size: 4,
            critical_queue_size: 2,
        });
        let slow = bus.subscribe(ClientId::new(1));
        let fast = bus.subscribe(ClientId::new(2));

        for i in 0..3 {
            bus.publish(BusEvent::critical(note(&format!("r{}", i))), None);
            // fast subscriber keeps up
            fast.recv().await.unwrap();
        }

        assert!(slow.recv().await.is_none());
        assert!(!bus.is_subscribed(ClientId::new(1)));
        assert!(bus.is_subscribed(ClientId::new(2)));
        assert_eq!(bus.stats().evicted_subscribers, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_subscription() {
        let bus = EventBus::default();
        let id = ClientId::new(1);
        let sub = bus.subscribe(id);

        bus.unsubscribe(id);
        bus.unsubscribe(id);

        assert!(sub.recv().await.is_none());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(BusEvent::critical(note("nobody")), None), 0);
    }

    #[tokio::test]
    async fn test_send_to_single_subscriber() {
        let bus = EventBus::default();
        let a = bus.subscribe(ClientId::new(1));
        let b = bus.subscribe(ClientId::new(2));

        assert!(bus.send_to(ClientId::new(1), BusEvent::critical(note("only you"))));
        assert!(!bus.send_to(ClientId::new(9), BusEvent::critical(note("nobody"))));

        assert_eq!(a.pending(), 1);
        assert_eq!(b.pending(), 0);
    }

    #[tokio::test]
    async fn test_evict_ignores_replaced_queue() {
        let bus = EventBus::default();
        let id = ClientId::new(1);
        let stale = bus.subscribe(id);
        let current = bus.subscribe(id);

        bus.evict(id, &stale.queue);

        assert!(bus.is_subscribed(id));
        assert_eq!(bus.stats().evicted_subscribers, 0);
        assert!(bus.send_to(id, BusEvent::critical(note("still here"))));
        assert_eq!(current.pending(), 1);

        bus.evict(id, &current.queue);
        assert!(!bus.is_subscribed(id));
        assert_eq!(bus.stats().evicted_subscribers, 1);
    }
}
