//! Per-venue event dispatch: apply to local state, sequence, publish, record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::balance::BalanceBook;
use super::bus::EventBus;
use super::order::{InboundOutcome, OrderTracker};
use super::recorder::Recorder;
use super::sequencer::Sequencer;
use crate::domain::{
    CanonicalEvent, ConnectionState, EventPayload, SessionChannel, Topic, Venue, VenueEvent,
};
use crate::port::Collection;

/// Shared by a venue's sessions and the gateway.
///
/// Sequencing and publishing happen under one lock, so events on a topic
/// reach subscribers in the order their sequence numbers were issued even
/// when several tasks feed the same topic.
pub struct Dispatcher {
    venue: Venue,
    sequencer: Mutex<Sequencer>,
    bus: EventBus,
    orders: Arc<OrderTracker>,
    balances: Arc<BalanceBook>,
    recorder: Option<Recorder>,
}

impl Dispatcher {
    pub fn new(
        venue: Venue,
        bus: EventBus,
        orders: Arc<OrderTracker>,
        balances: Arc<BalanceBook>,
        recorder: Option<Recorder>,
    ) -> Self {
        Self {
            venue,
            sequencer: Mutex::new(Sequencer::new()),
            bus,
            orders,
            balances,
            recorder,
        }
    }

    #[must_use]
    pub const fn venue(&self) -> Venue {
        self.venue
    }

    /// Apply an inbound event to the order and balance tables, then publish it.
    ///
    /// A balance report the table refuses is not published.
    pub fn dispatch(&self, event: VenueEvent, received_at: DateTime<Utc>) -> Option<u64> {
        match &event.payload {
            EventPayload::OrderUpdate(report) => {
                match self.orders.apply_inbound(self.venue, report.clone()) {
                    InboundOutcome::Applied(order) => {
                        if let Some(recorder) = &self.recorder {
                            recorder.record(Collection::Orders, &order);
                        }
                    }
                    InboundOutcome::Ignored(reason) => {
                        debug!(venue = %self.venue, reason, "Order report not applied");
                    }
                    InboundOutcome::Held | InboundOutcome::Buffered => {}
                }
            }
            EventPayload::BalanceUpdate(report) => {
                let balance = self.balances.apply(self.venue, report)?;
                if let Some(recorder) = &self.recorder {
                    recorder.record(Collection::Balances, &balance);
                }
            }
            _ => {}
        }
        Some(self.publish(event, received_at))
    }

    /// Sequence and publish without touching local state.
    pub fn publish(&self, event: VenueEvent, received_at: DateTime<Utc>) -> u64 {
        let mut sequencer = self.sequencer.lock();
        let canonical = sequencer.stamp(event, received_at);
        let sequence = canonical.sequence;
        self.deliver(canonical);
        sequence
    }

    /// Announce a session state change on the venue's connection topic.
    pub fn connection_changed(
        &self,
        channel: SessionChannel,
        state: ConnectionState,
        reason: Option<String>,
    ) -> u64 {
        let event = VenueEvent::new(
            Topic::connection(self.venue),
            None,
            EventPayload::ConnectionStateChange {
                channel,
                state,
                reason,
            },
        );
        self.publish(event, Utc::now())
    }

    fn deliver(&self, event: CanonicalEvent) {
        if let Some(recorder) = &self.recorder {
            recorder.record(Collection::Events, &event);
        }
        let topic = event.topic.clone();
        let sequence = event.sequence;
        let delivered = self.bus.publish(event);
        trace!(topic = %topic, sequence, delivered, "Event published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bus::Delivery;
    use crate::domain::{Asset, BalanceReport, OrderState};
    use crate::testkit;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn dispatcher(bus: &EventBus) -> (Dispatcher, Arc<OrderTracker>, Arc<BalanceBook>) {
        let orders = Arc::new(OrderTracker::new(Duration::from_secs(60), Duration::from_secs(60)));
        let balances = Arc::new(BalanceBook::new());
        let dispatcher = Dispatcher::new(
            Venue::Binance,
            bus.clone(),
            Arc::clone(&orders),
            Arc::clone(&balances),
            None,
        );
        (dispatcher, orders, balances)
    }

    #[test]
    fn test_order_update_applied_before_publish() {
        let bus = EventBus::new(16);
        let (dispatcher, orders, _) = dispatcher(&bus);
        let mut sub = bus.subscribe(Topic::orders(Venue::Binance));

        let mut order = testkit::domain::limit_order(dec!(2), dec!(10));
        order.state = OrderState::Acknowledged;
        orders.register(order.clone()).unwrap();

        let report = testkit::domain::fill_report(&order, dec!(2), Some(dec!(10)), None);
        let event = VenueEvent::new(Topic::orders(Venue::Binance), None, EventPayload::OrderUpdate(report));
        assert_eq!(dispatcher.dispatch(event, Utc::now()), Some(1));

        assert_eq!(orders.get(&order.client_order_id).unwrap().state, OrderState::Filled);
        let Some(Delivery::Event(event)) = sub.try_recv() else {
            panic!("expected order event");
        };
        assert_eq!(event.sequence, 1);
    }

    #[test]
    fn test_negative_balance_not_published() {
        let bus = EventBus::new(16);
        let (dispatcher, _, balances) = dispatcher(&bus);
        let mut sub = bus.subscribe(Topic::balances(Venue::Binance));

        let bad = VenueEvent::new(
            Topic::balances(Venue::Binance),
            None,
            EventPayload::BalanceUpdate(BalanceReport::new("USDT", dec!(-1), dec!(0))),
        );
        assert_eq!(dispatcher.dispatch(bad, Utc::now()), None);
        assert!(sub.try_recv().is_none());

        let good = VenueEvent::new(
            Topic::balances(Venue::Binance),
            None,
            EventPayload::BalanceUpdate(BalanceReport::new("USDT", dec!(5), dec!(0))),
        );
        assert_eq!(dispatcher.dispatch(good, Utc::now()), Some(1));
        assert_eq!(balances.get(Venue::Binance, &Asset::new("USDT")).unwrap().available, dec!(5));
    }

    #[test]
    fn test_connection_changes_share_one_sequence() {
        let bus = EventBus::new(16);
        let (dispatcher, _, _) = dispatcher(&bus);

        assert_eq!(dispatcher.connection_changed(SessionChannel::Public, ConnectionState::Connecting, None), 1);
        assert_eq!(dispatcher.connection_changed(SessionChannel::Private, ConnectionState::Connecting, None), 2);
    }
}
