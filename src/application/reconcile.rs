//! Resolution of ambiguous submits and cancels by querying the venue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::order::OrderTracker;
use super::recorder::Recorder;
use crate::domain::{ClientOrderId, EventPayload, Order, OrderReport, Topic, VenueEvent};
use crate::error::{Error, Result};
use crate::port::{Collection, OrderApi, QueryOutcome};

/// Queries a venue for orders whose submit or cancel outcome is unknown.
pub struct Reconciler {
    orders: Arc<OrderTracker>,
    api: Arc<dyn OrderApi>,
    dispatcher: Arc<Dispatcher>,
    recorder: Option<Recorder>,
    attempts: u32,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        orders: Arc<OrderTracker>,
        api: Arc<dyn OrderApi>,
        dispatcher: Arc<Dispatcher>,
        recorder: Option<Recorder>,
        attempts: u32,
        interval: Duration,
    ) -> Self {
        Self {
            orders,
            api,
            dispatcher,
            recorder,
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Query up to the configured number of times.
    ///
    /// # Errors
    ///
    /// [`Error::AmbiguousOutcome`] when every query failed; the order stays
    /// pending and the housekeeping sweep keeps trying.
    pub async fn reconcile(&self, id: &ClientOrderId) -> Result<Order> {
        let mut last_error = None;
        for attempt in 1..=self.attempts {
            if attempt > 1 {
                sleep(self.interval).await;
            }
            match self.query_once(id).await {
                Ok(order) => return Ok(order),
                Err(e) => {
                    warn!(client_order_id = %id, attempt, error = %e, "Reconciliation query failed");
                    last_error = Some(e);
                }
            }
        }
        Err(Error::AmbiguousOutcome(format!(
            "order {id} unresolved after {} queries: {}",
            self.attempts,
            last_error.map_or_else(|| "no response".to_string(), |e| e.to_string())
        )))
    }

    /// One query, applied to the order.
    pub async fn query_once(&self, id: &ClientOrderId) -> Result<Order> {
        let locator = self
            .orders
            .get(id)
            .ok_or_else(|| Error::OrderNotFound(id.clone()))?
            .locator();
        let outcome = self.api.query_order(&locator).await?;

        let found = match &outcome {
            QueryOutcome::Found(report) => Some(report.clone()),
            QueryOutcome::NotFound => None,
        };
        let order = self.orders.resolve_ambiguous(id, outcome)?;
        info!(client_order_id = %id, state = %order.state, "Order reconciled");
        self.publish(id, found, &order);
        Ok(order)
    }

    /// One query for an order whose cancel outcome is unknown.
    pub async fn query_cancel(&self, id: &ClientOrderId) -> Result<Order> {
        let locator = self
            .orders
            .get(id)
            .ok_or_else(|| Error::OrderNotFound(id.clone()))?
            .locator();
        let outcome = self.api.query_order(&locator).await?;

        let found = match &outcome {
            QueryOutcome::Found(report) => Some(report.clone()),
            QueryOutcome::NotFound => None,
        };
        let order = self.orders.resolve_cancel(id, outcome)?;
        info!(client_order_id = %id, state = %order.state, "Cancel reconciled");
        self.publish(id, found, &order);
        Ok(order)
    }

    fn publish(&self, id: &ClientOrderId, found: Option<OrderReport>, order: &Order) {
        if let Some(mut report) = found {
            if report.client_order_id.is_none() {
                report.client_order_id = Some(id.clone());
            }
            let event = VenueEvent::new(
                Topic::orders(self.dispatcher.venue()),
                report.timestamp,
                EventPayload::OrderUpdate(report),
            );
            self.dispatcher.publish(event, Utc::now());
        }
        if let Some(recorder) = &self.recorder {
            recorder.record(Collection::Orders, order);
        }
    }

    /// Query every order of this venue with an unknown submit or cancel outcome once.
    pub async fn sweep(&self) {
        let venue = self.dispatcher.venue();
        for locator in self.orders.ambiguous_orders(venue) {
            if let Err(e) = self.query_once(&locator.client_order_id).await {
                debug!(client_order_id = %locator.client_order_id, error = %e, "Order still unresolved");
            }
        }
        for locator in self.orders.unresolved_cancels(venue) {
            if let Err(e) = self.query_cancel(&locator.client_order_id).await {
                debug!(client_order_id = %locator.client_order_id, error = %e, "Cancel still unresolved");
            }
        }
    }
}
