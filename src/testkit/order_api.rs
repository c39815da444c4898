//! Scripted [`OrderApi`] for gateway tests.
//!
//! Each call pops the next queued result. When a queue is exhausted:
//! placement acknowledges with venue id `V{n}`, cancel succeeds and queries
//! return `NotFound`. Open orders and balances return the configured lists.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{
    BalanceReport, InstrumentId, Order, OrderLocator, OrderReport, Venue, VenueOrderId,
};
use crate::error::Result;
use crate::port::{OrderApi, PlaceAck, QueryOutcome};

pub struct ScriptedOrderApi {
    venue: Venue,
    place_results: Mutex<VecDeque<Result<PlaceAck>>>,
    cancel_results: Mutex<VecDeque<Result<()>>>,
    query_results: Mutex<VecDeque<Result<QueryOutcome>>>,
    balances: Mutex<Vec<BalanceReport>>,
    open_orders: Mutex<Vec<OrderReport>>,
    place_delay: Option<Duration>,
    placed: Mutex<Vec<Order>>,
    cancel_calls: AtomicU32,
    query_calls: AtomicU32,
    balance_calls: AtomicU32,
}

impl ScriptedOrderApi {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            place_results: Mutex::new(VecDeque::new()),
            cancel_results: Mutex::new(VecDeque::new()),
            query_results: Mutex::new(VecDeque::new()),
            balances: Mutex::new(Vec::new()),
            open_orders: Mutex::new(Vec::new()),
            place_delay: None,
            placed: Mutex::new(Vec::new()),
            cancel_calls: AtomicU32::new(0),
            query_calls: AtomicU32::new(0),
            balance_calls: AtomicU32::new(0),
        }
    }

    pub fn with_place_results(self, results: Vec<Result<PlaceAck>>) -> Self {
        *self.place_results.lock() = results.into();
        self
    }

    pub fn with_cancel_results(self, results: Vec<Result<()>>) -> Self {
        *self.cancel_results.lock() = results.into();
        self
    }

    pub fn with_query_results(self, results: Vec<Result<QueryOutcome>>) -> Self {
        *self.query_results.lock() = results.into();
        self
    }

    /// Queue a query result after construction.
    pub fn push_query_result(&self, result: Result<QueryOutcome>) {
        self.query_results.lock().push_back(result);
    }

    pub fn with_balances(self, balances: Vec<BalanceReport>) -> Self {
        *self.balances.lock() = balances;
        self
    }

    pub fn with_open_orders(self, reports: Vec<OrderReport>) -> Self {
        *self.open_orders.lock() = reports;
        self
    }

    /// Hold every placement for `delay` before answering.
    pub fn with_place_delay(mut self, delay: Duration) -> Self {
        self.place_delay = Some(delay);
        self
    }

    /// Orders as they were when placement was requested.
    pub fn placed(&self) -> Vec<Order> {
        self.placed.lock().clone()
    }

    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> u32 {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> u32 {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderApi for ScriptedOrderApi {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, order: &Order) -> Result<PlaceAck> {
        let count = {
            let mut placed = self.placed.lock();
            placed.push(order.clone());
            placed.len()
        };
        if let Some(delay) = self.place_delay {
            tokio::time::sleep(delay).await;
        }
        self.place_results.lock().pop_front().unwrap_or_else(|| {
            Ok(PlaceAck {
                venue_order_id: Some(VenueOrderId::new(format!("V{count}"))),
                report: None,
            })
        })
    }

    async fn cancel_order(&self, _order: &OrderLocator) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancel_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn query_order(&self, _order: &OrderLocator) -> Result<QueryOutcome> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.query_results
            .lock()
            .pop_front()
            .unwrap_or(Ok(QueryOutcome::NotFound))
    }

    async fn open_orders(&self, instrument: &InstrumentId) -> Result<Vec<OrderReport>> {
        Ok(self
            .open_orders
            .lock()
            .iter()
            .filter(|report| &report.instrument == instrument)
            .cloned()
            .collect())
    }

    async fn balances(&self) -> Result<Vec<BalanceReport>> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balances.lock().clone())
    }
}
