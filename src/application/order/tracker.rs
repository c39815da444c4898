//! Live order table.
//!
//! Orders are keyed by client id with a secondary index on (venue, venue id).
//! Each order sits behind its own lock so unrelated orders and venues never
//! serialize on each other; no lock is held across an await.
//!
//! Inbound reports take one of three paths:
//! - known order, outcome settled: applied immediately;
//! - known order in the pending-unknown sub-state: held on the order until
//!   reconciliation resolves it, then replayed in arrival order;
//! - unknown order: buffered by client or venue id and applied once the order
//!   is registered or acknowledged, or dropped after a TTL.
//!
//! A cancel whose outcome is unknown leaves the order CancelRequested and
//! flagged until a report or a venue query settles it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::state::{self, ReportEffect};
use crate::domain::{
    ClientOrderId, Order, OrderLocator, OrderReport, OrderState, Venue, VenueOrderId,
};
use crate::error::{Error, Result};
use crate::port::QueryOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PendingKey {
    Client(ClientOrderId),
    Venue(Venue, VenueOrderId),
}

struct TrackedOrder {
    order: Order,
    /// Reports received while the order's outcome was unknown.
    held: Vec<OrderReport>,
    /// A cancel was sent but its outcome is unknown.
    cancel_unresolved: bool,
    terminal_since: Option<Instant>,
}

/// What happened to an inbound report.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Applied; carries the order as it now stands.
    Applied(Order),
    /// Order outcome unknown; held until reconciliation.
    Held,
    /// No matching order yet; buffered.
    Buffered,
    Ignored(&'static str),
}

/// Counts from one housekeeping sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub evicted_orders: usize,
    pub expired_reports: usize,
}

pub struct OrderTracker {
    orders: DashMap<ClientOrderId, Arc<Mutex<TrackedOrder>>>,
    by_venue_id: DashMap<(Venue, VenueOrderId), ClientOrderId>,
    pending: DashMap<PendingKey, Vec<(Instant, OrderReport)>>,
    retention: Duration,
    pending_ttl: Duration,
}

impl OrderTracker {
    pub fn new(retention: Duration, pending_ttl: Duration) -> Self {
        Self {
            orders: DashMap::new(),
            by_venue_id: DashMap::new(),
            pending: DashMap::new(),
            retention,
            pending_ttl,
        }
    }

    /// Add a freshly created order and apply anything buffered for its client id.
    pub fn register(&self, order: Order) -> Result<()> {
        let id = order.client_order_id.clone();
        let venue = order.venue;
        if self.orders.contains_key(&id) {
            return Err(Error::InvalidOrder(format!("duplicate client order id {id}")));
        }
        self.orders.insert(
            id.clone(),
            Arc::new(Mutex::new(TrackedOrder {
                order,
                held: Vec::new(),
                cancel_unresolved: false,
                terminal_since: None,
            })),
        );
        self.drain_pending(venue, &PendingKey::Client(id));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &ClientOrderId) -> Option<Order> {
        self.entry(id).map(|entry| entry.lock().order.clone())
    }

    #[must_use]
    pub fn find_by_venue_id(&self, venue: Venue, venue_id: &VenueOrderId) -> Option<Order> {
        let client_id = self.by_venue_id.get(&(venue, venue_id.clone()))?.clone();
        self.get(&client_id)
    }

    /// Non-terminal orders of a venue.
    #[must_use]
    pub fn open_orders(&self, venue: Venue) -> Vec<Order> {
        let entries: Vec<_> = self.orders.iter().map(|e| Arc::clone(e.value())).collect();
        entries
            .into_iter()
            .filter_map(|entry| {
                let tracked = entry.lock();
                (tracked.order.venue == venue && !tracked.order.state.is_terminal())
                    .then(|| tracked.order.clone())
            })
            .collect()
    }

    /// Orders of a venue whose submit outcome is still unknown.
    #[must_use]
    pub fn ambiguous_orders(&self, venue: Venue) -> Vec<OrderLocator> {
        let entries: Vec<_> = self.orders.iter().map(|e| Arc::clone(e.value())).collect();
        entries
            .into_iter()
            .filter_map(|entry| {
                let tracked = entry.lock();
                (tracked.order.venue == venue && tracked.order.state.is_pending_unknown())
                    .then(|| tracked.order.locator())
            })
            .collect()
    }

    /// Orders of a venue still CancelRequested after a cancel with unknown outcome.
    #[must_use]
    pub fn unresolved_cancels(&self, venue: Venue) -> Vec<OrderLocator> {
        let entries: Vec<_> = self.orders.iter().map(|e| Arc::clone(e.value())).collect();
        entries
            .into_iter()
            .filter_map(|entry| {
                let mut tracked = entry.lock();
                if tracked.order.state != OrderState::CancelRequested {
                    tracked.cancel_unresolved = false;
                }
                (tracked.order.venue == venue && tracked.cancel_unresolved)
                    .then(|| tracked.order.locator())
            })
            .collect()
    }

    /// Flag a CancelRequested order whose cancel call had an unknown outcome.
    pub fn mark_cancel_unresolved(&self, id: &ClientOrderId) -> Result<()> {
        let entry = self
            .entry(id)
            .ok_or_else(|| Error::OrderNotFound(id.clone()))?;
        let mut tracked = entry.lock();
        tracked.cancel_unresolved = tracked.order.state == OrderState::CancelRequested;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Run `f` on the order under its lock. Mutations must go through [`state`].
    pub fn update<R>(&self, id: &ClientOrderId, f: impl FnOnce(&mut Order) -> R) -> Result<R> {
        let entry = self
            .entry(id)
            .ok_or_else(|| Error::OrderNotFound(id.clone()))?;
        let mut tracked = entry.lock();
        let result = f(&mut tracked.order);
        Self::mark_terminal(&mut tracked);
        Ok(result)
    }

    /// Record the venue id once known and apply reports buffered under it.
    pub fn set_venue_order_id(&self, id: &ClientOrderId, venue_id: VenueOrderId) -> Result<()> {
        let venue = {
            let entry = self
                .entry(id)
                .ok_or_else(|| Error::OrderNotFound(id.clone()))?;
            let mut tracked = entry.lock();
            if tracked.order.venue_order_id.is_none() {
                tracked.order.venue_order_id = Some(venue_id.clone());
            }
            tracked.order.venue
        };
        self.by_venue_id.insert((venue, venue_id.clone()), id.clone());
        self.drain_pending(venue, &PendingKey::Venue(venue, venue_id));
        Ok(())
    }

    /// Route an inbound venue report to its order.
    pub fn apply_inbound(&self, venue: Venue, report: OrderReport) -> InboundOutcome {
        let client_id = report
            .client_order_id
            .as_ref()
            .filter(|id| self.orders.contains_key(*id))
            .cloned()
            .or_else(|| {
                report.venue_order_id.as_ref().and_then(|venue_id| {
                    self.by_venue_id
                        .get(&(venue, venue_id.clone()))
                        .map(|id| id.clone())
                })
            });

        let Some(client_id) = client_id else {
            return self.buffer(venue, report);
        };
        let Some(entry) = self.entry(&client_id) else {
            return self.buffer(venue, report);
        };

        let (outcome, new_venue_id) = {
            let mut tracked = entry.lock();
            if tracked.order.venue != venue {
                return InboundOutcome::Ignored("report from another venue");
            }
            let new_venue_id = match (&tracked.order.venue_order_id, &report.venue_order_id) {
                (None, Some(venue_id)) => {
                    tracked.order.venue_order_id = Some(venue_id.clone());
                    Some(venue_id.clone())
                }
                _ => None,
            };

            let outcome = if tracked.order.state.is_pending_unknown() {
                debug!(client_order_id = %client_id, "Holding report until reconciliation");
                tracked.held.push(report);
                InboundOutcome::Held
            } else {
                match state::apply_report(&mut tracked.order, &report, Utc::now()) {
                    ReportEffect::Applied => {
                        Self::mark_terminal(&mut tracked);
                        InboundOutcome::Applied(tracked.order.clone())
                    }
                    ReportEffect::Ignored(reason) => InboundOutcome::Ignored(reason),
                }
            };
            (outcome, new_venue_id)
        };

        if let Some(venue_id) = new_venue_id {
            self.by_venue_id.insert((venue, venue_id.clone()), client_id);
            self.drain_pending(venue, &PendingKey::Venue(venue, venue_id));
        }
        outcome
    }

    /// Settle a pending-unknown order from a reconciliation query.
    ///
    /// `NotFound` means the venue never accepted it: the order fails. `Found`
    /// applies the venue's view, then any reports held meanwhile.
    pub fn resolve_ambiguous(&self, id: &ClientOrderId, outcome: QueryOutcome) -> Result<Order> {
        let entry = self
            .entry(id)
            .ok_or_else(|| Error::OrderNotFound(id.clone()))?;

        let (order, new_venue_id) = {
            let mut tracked = entry.lock();
            if !tracked.order.state.is_pending_unknown() {
                return Ok(tracked.order.clone());
            }
            let now = Utc::now();
            let held = std::mem::take(&mut tracked.held);

            let mut new_venue_id = None;
            match outcome {
                QueryOutcome::NotFound => {
                    info!(client_order_id = %id, "Order not found at venue, marking failed");
                    tracked.order.reason = Some("not found at venue after ambiguous submit".into());
                    state::transition(&mut tracked.order, OrderState::Failed, now);
                }
                QueryOutcome::Found(report) => {
                    state::transition(&mut tracked.order, OrderState::Submitting { ambiguous: false }, now);
                    if tracked.order.venue_order_id.is_none() {
                        tracked.order.venue_order_id = report.venue_order_id.clone();
                        new_venue_id = report.venue_order_id.clone();
                    }
                    state::apply_report(&mut tracked.order, &report, now);
                    if tracked.order.state == (OrderState::Submitting { ambiguous: false }) {
                        state::transition(&mut tracked.order, OrderState::Acknowledged, now);
                    }
                    for report in &held {
                        state::apply_report(&mut tracked.order, report, now);
                    }
                }
            }
            Self::mark_terminal(&mut tracked);
            (tracked.order.clone(), new_venue_id)
        };

        if let Some(venue_id) = new_venue_id {
            self.by_venue_id.insert((order.venue, venue_id.clone()), id.clone());
            self.drain_pending(order.venue, &PendingKey::Venue(order.venue, venue_id));
        }
        Ok(order)
    }

    /// Settle a cancel whose outcome was unknown from a venue query.
    ///
    /// A closed order at the venue is applied as reported. An order the venue
    /// still shows open means the cancel never took effect: the pre-cancel
    /// state is restored. `NotFound` means the venue no longer knows the order
    /// and it is taken as canceled.
    pub fn resolve_cancel(&self, id: &ClientOrderId, outcome: QueryOutcome) -> Result<Order> {
        let entry = self
            .entry(id)
            .ok_or_else(|| Error::OrderNotFound(id.clone()))?;
        let mut tracked = entry.lock();
        tracked.cancel_unresolved = false;
        if tracked.order.state != OrderState::CancelRequested {
            return Ok(tracked.order.clone());
        }
        let now = Utc::now();
        match outcome {
            QueryOutcome::NotFound => {
                info!(client_order_id = %id, "Order gone at venue after cancel, marking canceled");
                tracked.order.reason = Some("not found at venue after cancel".into());
                state::transition(&mut tracked.order, OrderState::Canceled, now);
            }
            QueryOutcome::Found(report) => {
                state::apply_report(&mut tracked.order, &report, now);
                if tracked.order.state == OrderState::CancelRequested && report.status.is_open() {
                    info!(client_order_id = %id, "Order still open at venue, cancel did not apply");
                    state::cancel_refused(&mut tracked.order, "cancel not applied at venue", now);
                }
            }
        }
        Self::mark_terminal(&mut tracked);
        Ok(tracked.order.clone())
    }

    /// Evict terminal orders past retention and expired buffered reports.
    pub fn sweep(&self, now: Instant) -> SweepStats {
        let mut stats = SweepStats::default();

        let expired: Vec<(ClientOrderId, Option<(Venue, VenueOrderId)>)> = self
            .orders
            .iter()
            .filter_map(|entry| {
                let tracked = entry.value().lock();
                let since = tracked.terminal_since?;
                (now.saturating_duration_since(since) >= self.retention).then(|| {
                    (
                        entry.key().clone(),
                        tracked
                            .order
                            .venue_order_id
                            .clone()
                            .map(|v| (tracked.order.venue, v)),
                    )
                })
            })
            .collect();
        for (id, venue_key) in expired {
            self.orders.remove(&id);
            if let Some(key) = venue_key {
                self.by_venue_id.remove(&key);
            }
            stats.evicted_orders += 1;
        }

        self.pending.retain(|key, reports| {
            let before = reports.len();
            reports.retain(|(at, _)| now.saturating_duration_since(*at) < self.pending_ttl);
            let expired = before - reports.len();
            if expired > 0 {
                warn!(key = ?key, expired, "Dropping buffered reports for unknown order");
            }
            stats.expired_reports += expired;
            !reports.is_empty()
        });

        if stats.evicted_orders > 0 {
            debug!(evicted = stats.evicted_orders, "Evicted terminal orders");
        }
        stats
    }

    fn entry(&self, id: &ClientOrderId) -> Option<Arc<Mutex<TrackedOrder>>> {
        self.orders.get(id).map(|e| Arc::clone(e.value()))
    }

    fn mark_terminal(tracked: &mut TrackedOrder) {
        if tracked.order.state.is_terminal() && tracked.terminal_since.is_none() {
            tracked.terminal_since = Some(Instant::now());
        }
    }

    fn buffer(&self, venue: Venue, report: OrderReport) -> InboundOutcome {
        let key = match (&report.client_order_id, &report.venue_order_id) {
            (_, Some(venue_id)) => PendingKey::Venue(venue, venue_id.clone()),
            (Some(client_id), None) => PendingKey::Client(client_id.clone()),
            (None, None) => return InboundOutcome::Ignored("report carries no order id"),
        };
        debug!(key = ?key, "Buffering report for unknown order");
        self.pending
            .entry(key.clone())
            .or_default()
            .push((Instant::now(), report));

        // The order may have been registered or acknowledged between the
        // lookup and the insert above, after its drain already ran.
        if self.is_indexed(&key) {
            self.drain_pending(venue, &key);
        }
        InboundOutcome::Buffered
    }

    fn is_indexed(&self, key: &PendingKey) -> bool {
        match key {
            PendingKey::Client(id) => self.orders.contains_key(id),
            PendingKey::Venue(venue, venue_id) => self
                .by_venue_id
                .get(&(*venue, venue_id.clone()))
                .is_some_and(|id| self.orders.contains_key(id.value())),
        }
    }

    fn drain_pending(&self, venue: Venue, key: &PendingKey) {
        let Some((_, reports)) = self.pending.remove(key) else {
            return;
        };
        debug!(key = ?key, count = reports.len(), "Applying buffered reports");
        for (_, mut report) in reports {
            // Buffered by venue id; the client id may be unknown to this process.
            if let PendingKey::Venue(..) = key {
                report.client_order_id = None;
            }
            self.apply_inbound(venue, report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VenueOrderStatus;
    use crate::testkit;
    use rust_decimal_macros::dec;

    fn tracker() -> OrderTracker {
        OrderTracker::new(Duration::from_secs(60), Duration::from_secs(10))
    }

    fn submitted(tracker: &OrderTracker) -> Order {
        let mut order = testkit::domain::limit_order(dec!(1.0), dec!(100));
        order.state = OrderState::Submitting { ambiguous: false };
        tracker.register(order.clone()).unwrap();
        order
    }

    #[test]
    fn test_report_before_ack_is_buffered_by_venue_id() {
        let tracker = tracker();
        let order = submitted(&tracker);

        let mut fill = testkit::domain::fill_report(&order, dec!(0.4), None, Some(dec!(100)));
        fill.client_order_id = None;
        fill.venue_order_id = Some(VenueOrderId::new("V1"));
        assert_eq!(tracker.apply_inbound(order.venue, fill), InboundOutcome::Buffered);

        tracker
            .set_venue_order_id(&order.client_order_id, VenueOrderId::new("V1"))
            .unwrap();

        let order = tracker.get(&order.client_order_id).unwrap();
        assert_eq!(order.filled_quantity, dec!(0.4));
        assert_eq!(order.state, OrderState::PartiallyFilled);
        assert!(tracker
            .find_by_venue_id(order.venue, &VenueOrderId::new("V1"))
            .is_some());
    }

    #[test]
    fn test_reports_held_while_ambiguous_and_replayed() {
        let tracker = tracker();
        let order = submitted(&tracker);
        let id = order.client_order_id.clone();
        tracker
            .update(&id, |o| {
                state::transition(o, OrderState::Submitting { ambiguous: true }, Utc::now())
            })
            .unwrap();

        let fill = testkit::domain::fill_report(&order, dec!(0.5), None, Some(dec!(100)));
        assert_eq!(tracker.apply_inbound(order.venue, fill), InboundOutcome::Held);
        assert_eq!(tracker.get(&id).unwrap().filled_quantity, dec!(0));

        let found = testkit::domain::status_report(&order, VenueOrderStatus::New)
            .with_ids(Some(id.clone()), Some(VenueOrderId::new("V9")));
        let resolved = tracker.resolve_ambiguous(&id, QueryOutcome::Found(found)).unwrap();

        assert_eq!(resolved.state, OrderState::PartiallyFilled);
        assert_eq!(resolved.filled_quantity, dec!(0.5));
        assert_eq!(resolved.venue_order_id, Some(VenueOrderId::new("V9")));
    }

    #[test]
    fn test_not_found_resolves_to_failed() {
        let tracker = tracker();
        let order = submitted(&tracker);
        let id = order.client_order_id.clone();
        tracker
            .update(&id, |o| {
                state::transition(o, OrderState::Submitting { ambiguous: true }, Utc::now())
            })
            .unwrap();

        let resolved = tracker.resolve_ambiguous(&id, QueryOutcome::NotFound).unwrap();
        assert_eq!(resolved.state, OrderState::Failed);
        assert!(tracker.ambiguous_orders(order.venue).is_empty());
    }

    #[test]
    fn test_register_applies_buffered_client_reports() {
        let tracker = tracker();
        let mut order = testkit::domain::limit_order(dec!(1.0), dec!(100));
        order.state = OrderState::Submitting { ambiguous: false };

        let ack = testkit::domain::status_report(&order, VenueOrderStatus::New);
        assert_eq!(tracker.apply_inbound(order.venue, ack), InboundOutcome::Buffered);

        tracker.register(order.clone()).unwrap();
        assert_eq!(
            tracker.get(&order.client_order_id).unwrap().state,
            OrderState::Acknowledged
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let tracker = tracker();
        let order = submitted(&tracker);
        assert!(tracker.register(order).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_after_retention() {
        let tracker = tracker();
        let order = submitted(&tracker);
        let id = order.client_order_id.clone();

        let filled = testkit::domain::fill_report(&order, dec!(1.0), Some(dec!(100)), None);
        assert!(matches!(
            tracker.apply_inbound(order.venue, filled),
            InboundOutcome::Applied(_)
        ));

        assert_eq!(tracker.sweep(Instant::now()).evicted_orders, 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.sweep(Instant::now()).evicted_orders, 1);
        assert!(tracker.get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expires_buffered_reports() {
        let tracker = tracker();
        let order = testkit::domain::limit_order(dec!(1.0), dec!(100));
        let ack = testkit::domain::status_report(&order, VenueOrderStatus::New);
        tracker.apply_inbound(order.venue, ack);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(tracker.sweep(Instant::now()).expired_reports, 1);

        tracker.register(order.clone()).unwrap();
        assert_eq!(
            tracker.get(&order.client_order_id).unwrap().state,
            OrderState::Created
        );
    }

    #[test]
    fn test_fill_monotonic_for_any_report_order() {
        let permutations: [[rust_decimal::Decimal; 3]; 4] = [
            [dec!(0.2), dec!(0.5), dec!(0.9)],
            [dec!(0.9), dec!(0.2), dec!(0.5)],
            [dec!(0.5), dec!(0.5), dec!(0.2)],
            [dec!(0.2), dec!(0.9), dec!(0.9)],
        ];
        for fills in permutations {
            let tracker = tracker();
            let order = submitted(&tracker);
            let mut last = dec!(0);
            for filled in fills {
                let report = testkit::domain::fill_report(&order, filled, None, Some(dec!(100)));
                tracker.apply_inbound(order.venue, report);
                let now = tracker.get(&order.client_order_id).unwrap().filled_quantity;
                assert!(now >= last, "filled went backwards: {last} -> {now}");
                last = now;
            }
            assert_eq!(Some(&last), fills.iter().max());
        }
    }

    #[test]
    fn test_report_racing_venue_id_is_never_stranded() {
        for _ in 0..2_000 {
            let tracker = tracker();
            let order = submitted(&tracker);
            let mut fill = testkit::domain::fill_report(&order, dec!(0.4), None, Some(dec!(100)));
            fill.client_order_id = None;
            fill.venue_order_id = Some(VenueOrderId::new("V1"));
            let barrier = std::sync::Barrier::new(2);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    tracker
                        .set_venue_order_id(&order.client_order_id, VenueOrderId::new("V1"))
                        .unwrap();
                });
                scope.spawn(|| {
                    barrier.wait();
                    tracker.apply_inbound(order.venue, fill);
                });
            });

            let order = tracker.get(&order.client_order_id).unwrap();
            assert_eq!(order.filled_quantity, dec!(0.4));
            assert_eq!(order.state, OrderState::PartiallyFilled);
        }
    }

    fn cancel_requested(tracker: &OrderTracker) -> Order {
        let order = submitted(tracker);
        let id = order.client_order_id.clone();
        tracker
            .update(&id, |o| {
                state::transition(o, OrderState::Acknowledged, Utc::now());
                state::request_cancel(o, Utc::now());
            })
            .unwrap();
        tracker.mark_cancel_unresolved(&id).unwrap();
        tracker.get(&id).unwrap()
    }

    #[test]
    fn test_unresolved_cancel_restored_when_still_open() {
        let tracker = tracker();
        let order = cancel_requested(&tracker);
        assert_eq!(tracker.unresolved_cancels(order.venue).len(), 1);

        let open = testkit::domain::status_report(&order, VenueOrderStatus::New);
        let resolved = tracker
            .resolve_cancel(&order.client_order_id, QueryOutcome::Found(open))
            .unwrap();
        assert_eq!(resolved.state, OrderState::Acknowledged);
        assert!(tracker.unresolved_cancels(order.venue).is_empty());
    }

    #[test]
    fn test_unresolved_cancel_settled_by_query() {
        let tracker = tracker();
        let order = cancel_requested(&tracker);
        let canceled = testkit::domain::status_report(&order, VenueOrderStatus::Canceled);
        let resolved = tracker
            .resolve_cancel(&order.client_order_id, QueryOutcome::Found(canceled))
            .unwrap();
        assert_eq!(resolved.state, OrderState::Canceled);

        let other = cancel_requested(&tracker);
        let resolved = tracker
            .resolve_cancel(&other.client_order_id, QueryOutcome::NotFound)
            .unwrap();
        assert_eq!(resolved.state, OrderState::Canceled);
    }

    #[test]
    fn test_inbound_report_clears_unresolved_cancel() {
        let tracker = tracker();
        let order = cancel_requested(&tracker);
        let filled = testkit::domain::fill_report(&order, dec!(1.0), Some(dec!(100)), None);
        tracker.apply_inbound(order.venue, filled);
        assert!(tracker.unresolved_cancels(order.venue).is_empty());
        assert_eq!(tracker.get(&order.client_order_id).unwrap().state, OrderState::Filled);
    }
}
