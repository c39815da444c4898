//! In-process publish/subscribe for canonical events.
//!
//! Each subscriber owns a bounded queue. Publishing never blocks: when a queue
//! is full its oldest event is dropped and the subscriber receives a single
//! [`Delivery::Overflow`] carrying the number of events lost, ahead of the
//! events that survived. Events of one topic reach every subscriber in publish
//! order; there is no ordering across topics.
//!
//! An optional [`EventBridge`] receives every published event through a
//! bounded channel drained by a background task. Bridge failures are logged
//! and counted, never propagated.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::domain::{CanonicalEvent, SubscriptionId, Topic};
use crate::port::EventBridge;

/// Item received by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(Arc<CanonicalEvent>),
    /// Events were dropped because the subscriber fell behind.
    Overflow { dropped: u64 },
}

impl Delivery {
    #[must_use]
    pub fn event(&self) -> Option<&CanonicalEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Overflow { .. } => None,
        }
    }
}

/// Snapshot of bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub subscribers: usize,
    pub published: u64,
    pub dropped: u64,
    pub bridge_failures: u64,
}

struct QueueState {
    events: VecDeque<Arc<CanonicalEvent>>,
    dropped: u64,
    closed: bool,
}

struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity.min(1_024)),
                dropped: 0,
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue, dropping the oldest event when full. Returns true if one was dropped.
    fn push(&self, event: Arc<CanonicalEvent>) -> bool {
        let overflowed = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            let overflowed = if state.events.len() >= self.capacity {
                state.events.pop_front();
                state.dropped += 1;
                true
            } else {
                false
            };
            state.events.push_back(event);
            overflowed
        };
        self.notify.notify_one();
        overflowed
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Option<Delivery>> {
        let mut state = self.state.lock();
        if state.dropped > 0 {
            let dropped = std::mem::take(&mut state.dropped);
            return Some(Some(Delivery::Overflow { dropped }));
        }
        if let Some(event) = state.events.pop_front() {
            return Some(Some(Delivery::Event(event)));
        }
        if state.closed {
            return Some(None);
        }
        None
    }
}

#[derive(Default)]
struct Table {
    by_topic: HashMap<Topic, HashMap<SubscriptionId, Arc<SubscriberQueue>>>,
    by_id: HashMap<SubscriptionId, (HashSet<Topic>, Arc<SubscriberQueue>)>,
}

impl Table {
    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<SubscriberQueue>> {
        let (topics, queue) = self.by_id.remove(&id)?;
        for topic in topics {
            if let Some(subscribers) = self.by_topic.get_mut(&topic) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    self.by_topic.remove(&topic);
                }
            }
        }
        Some(queue)
    }
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
    bridge_failures: AtomicU64,
}

struct Inner {
    table: RwLock<Table>,
    next_id: AtomicU64,
    capacity: usize,
    counters: Arc<Counters>,
    bridge: Option<mpsc::Sender<Arc<CanonicalEvent>>>,
}

/// The event bus. Cheap to clone; clones share one subscription table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None, Arc::new(Counters::default()))
    }

    /// Create a bus that also forwards every event to `bridge`.
    ///
    /// Spawns the forwarding task; must be called inside a Tokio runtime.
    pub fn with_bridge(capacity: usize, bridge_capacity: usize, bridge: Arc<dyn EventBridge>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Arc<CanonicalEvent>>(bridge_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let task_counters = Arc::clone(&counters);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let subject = event.topic.subject();
                if let Err(e) = bridge.forward(&subject, &event).await {
                    task_counters.bridge_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(bridge = bridge.name(), subject = %subject, error = %e, "Bridge forward failed");
                }
            }
            debug!(bridge = bridge.name(), "Bridge forwarder stopped");
        });

        Self::build(capacity, Some(tx), counters)
    }

    fn build(
        capacity: usize,
        bridge: Option<mpsc::Sender<Arc<CanonicalEvent>>>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: RwLock::new(Table::default()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                counters,
                bridge,
            }),
        }
    }

    /// Subscribe to one topic.
    #[must_use]
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.subscribe_all([topic])
    }

    /// Subscribe one queue to several topics.
    pub fn subscribe_all(&self, topics: impl IntoIterator<Item = Topic>) -> Subscription {
        let id = SubscriptionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(SubscriberQueue::new(self.inner.capacity));
        let topics: HashSet<Topic> = topics.into_iter().collect();

        {
            let mut table = self.inner.table.write();
            for topic in &topics {
                table
                    .by_topic
                    .entry(topic.clone())
                    .or_default()
                    .insert(id, Arc::clone(&queue));
            }
            table.by_id.insert(id, (topics, Arc::clone(&queue)));
        }

        debug!(subscription = %id, "Subscriber registered");
        Subscription {
            id,
            queue,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription. Its receiver drains what is queued, then ends.
    ///
    /// Returns false if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.table.write().remove(id);
        match removed {
            Some(queue) => {
                queue.close();
                debug!(subscription = %id, "Subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every subscriber of its topic. Never blocks.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: CanonicalEvent) -> usize {
        let event = Arc::new(event);
        self.inner.counters.published.fetch_add(1, Ordering::Relaxed);

        let delivered = {
            let table = self.inner.table.read();
            match table.by_topic.get(&event.topic) {
                Some(subscribers) => {
                    for (id, queue) in subscribers {
                        if queue.push(Arc::clone(&event)) {
                            self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                            debug!(subscription = %id, topic = %event.topic, "Subscriber queue full, dropped oldest event");
                        }
                    }
                    subscribers.len()
                }
                None => 0,
            }
        };

        if let Some(bridge) = &self.inner.bridge {
            if let Err(e) = bridge.try_send(Arc::clone(&event)) {
                self.inner
                    .counters
                    .bridge_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(topic = %event.topic, error = %e, "Bridge queue unavailable, event not forwarded");
            }
        }

        delivered
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        let counters = &self.inner.counters;
        BusStats {
            subscribers: self.inner.table.read().by_id.len(),
            published: counters.published.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            bridge_failures: counters.bridge_failures.load(Ordering::Relaxed),
        }
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    queue: Arc<SubscriberQueue>,
    bus: Weak<Inner>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next delivery. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            if let Some(next) = self.queue.pop() {
                return next;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Next delivery if one is ready.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.queue.pop().flatten()
    }

    /// Number of events waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.state.lock().events.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.table.write().remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::Venue;
    use crate::testkit;

    fn topic() -> Topic {
        testkit::domain::trades_topic(Venue::Binance, "BTC/USDT")
    }

    fn sequences(deliveries: &[Delivery]) -> Vec<u64> {
        deliveries
            .iter()
            .filter_map(|d| d.event().map(|e| e.sequence))
            .collect()
    }

    fn drain(sub: &mut Subscription) -> Vec<Delivery> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn test_publish_preserves_order() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe(topic());

        for seq in 1..=5 {
            bus.publish(testkit::domain::trade_event(topic(), seq));
        }

        assert_eq!(sequences(&drain(&mut sub)), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_slow_subscriber_gets_overflow_then_latest_events() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe(topic());

        for seq in 1..=15 {
            bus.publish(testkit::domain::trade_event(topic(), seq));
        }

        let deliveries = drain(&mut sub);
        assert_eq!(deliveries[0], Delivery::Overflow { dropped: 5 });
        assert_eq!(sequences(&deliveries), (6..=15).collect::<Vec<_>>());
        assert_eq!(
            deliveries
                .iter()
                .filter(|d| matches!(d, Delivery::Overflow { .. }))
                .count(),
            1
        );
        assert_eq!(bus.stats().dropped, 5);
    }

    #[test]
    fn test_other_topics_not_delivered() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe(topic());

        bus.publish(testkit::domain::trade_event(
            testkit::domain::trades_topic(Venue::Binance, "ETH/USDT"),
            1,
        ));

        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_slow_subscriber_does_not_affect_fast_one() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe(topic());
        let mut fast = bus.subscribe(topic());

        let mut fast_seen = Vec::new();
        for seq in 1..=5 {
            bus.publish(testkit::domain::trade_event(topic(), seq));
            fast_seen.extend(sequences(&drain(&mut fast)));
        }

        assert_eq!(fast_seen, vec![1, 2, 3, 4, 5]);
        let slow_deliveries = drain(&mut slow);
        assert_eq!(slow_deliveries[0], Delivery::Overflow { dropped: 3 });
        assert_eq!(sequences(&slow_deliveries), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_unsubscribe_drains_then_ends() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe(topic());
        bus.publish(testkit::domain::trade_event(topic(), 1));

        assert!(bus.unsubscribe(sub.id()));
        bus.publish(testkit::domain::trade_event(topic(), 2));

        assert_eq!(sequences(&[sub.recv().await.unwrap()]), vec![1]);
        assert!(sub.recv().await.is_none());
        assert!(!bus.unsubscribe(sub.id()));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe(topic());
        let publisher = bus.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(testkit::domain::trade_event(topic(), 7));
        });

        let delivery = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.event().unwrap().sequence, 7);
    }

    #[test]
    fn test_dropping_subscription_removes_it() {
        let bus = EventBus::new(10);
        let sub = bus.subscribe(topic());
        assert_eq!(bus.stats().subscribers, 1);
        drop(sub);
        assert_eq!(bus.stats().subscribers, 0);
        assert_eq!(bus.publish(testkit::domain::trade_event(topic(), 1)), 0);
    }

    #[tokio::test]
    async fn test_bridge_failure_does_not_affect_delivery() {
        let bridge = Arc::new(testkit::bridge::RecordingBridge::failing());
        let bus = EventBus::with_bridge(10, 10, bridge.clone());
        let mut sub = bus.subscribe(topic());

        bus.publish(testkit::domain::trade_event(topic(), 1));

        assert_eq!(sequences(&drain(&mut sub)), vec![1]);
        tokio::time::timeout(Duration::from_secs(1), async {
            while bus.stats().bridge_failures == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(bridge.attempts(), 1);
    }

    #[tokio::test]
    async fn test_bridge_receives_subject() {
        let bridge = Arc::new(testkit::bridge::RecordingBridge::new());
        let bus = EventBus::with_bridge(10, 10, bridge.clone());

        bus.publish(testkit::domain::trade_event(topic(), 1));

        tokio::time::timeout(Duration::from_secs(1), async {
            while bridge.subjects().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(bridge.subjects(), vec!["binance.trades.BTC/USDT".to_string()]);
    }
}
