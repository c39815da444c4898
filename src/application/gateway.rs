//! Gateway facade: the API strategies use.
//!
//! Every call is attributed to exactly one venue. The gateway owns the
//! order and balance tables and composes each venue's sessions, dispatcher
//! and order API behind one lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::balance::BalanceBook;
use super::book::TopOfBook;
use super::bus::{BusStats, Delivery, EventBus, Subscription};
use super::dispatch::Dispatcher;
use super::normalize::NormalizationPipeline;
use super::order::{state, OrderTracker};
use super::reconcile::Reconciler;
use super::recorder::Recorder;
use super::supervisor::{SessionSupervisor, SupervisorHandle};
use crate::domain::{
    Asset, Balance, ClientOrderId, ConnectionState, EventPayload, InstrumentId, Order,
    OrderReport, OrderSpec, OrderState, SubscriptionId, Topic, TopicKind, Venue, VenueEvent,
};
use crate::error::{Error, Result};
use crate::infrastructure::config::reconnect::ReconnectionConfig;
use crate::infrastructure::config::settings::OrdersConfig;
use crate::port::{
    BatchCancel, Collection, Normalizer, OrderApi, SessionFactory, WireSession,
};

/// Everything the gateway needs to run one venue.
pub struct VenueComponents {
    pub venue: Venue,
    pub normalizer: Arc<dyn Normalizer>,
    pub public: SessionFactory,
    /// Authenticated session for orders and balances, when credentials exist.
    pub private: Option<SessionFactory>,
    /// REST order operations, when trading is enabled.
    pub orders: Option<Arc<dyn OrderApi>>,
}

/// Opaque reference to a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderHandle {
    venue: Venue,
    client_order_id: ClientOrderId,
}

impl OrderHandle {
    #[must_use]
    pub const fn venue(&self) -> Venue {
        self.venue
    }

    #[must_use]
    pub fn client_order_id(&self) -> &ClientOrderId {
        &self.client_order_id
    }
}

/// Connection states of a venue's sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueConnection {
    pub public: ConnectionState,
    pub private: Option<ConnectionState>,
}

#[derive(Default)]
struct VenueRuntime {
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    /// Kept after stop so queries still see the final state.
    public: Option<SupervisorHandle>,
    private: Option<SupervisorHandle>,
}

impl VenueRuntime {
    fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

struct VenueSlot {
    components: VenueComponents,
    dispatcher: Arc<Dispatcher>,
    reconciler: Option<Arc<Reconciler>>,
    runtime: Mutex<VenueRuntime>,
    /// Subscriber count per market-data topic; keys are the session's active set.
    market_refs: Mutex<HashMap<Topic, usize>>,
}

impl VenueSlot {
    fn venue(&self) -> Venue {
        self.components.venue
    }

    fn running_public(&self) -> Option<SupervisorHandle> {
        let runtime = self.runtime.lock();
        runtime
            .is_running()
            .then(|| runtime.public.clone())
            .flatten()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.runtime.lock().is_running() {
            Ok(())
        } else {
            Err(Error::VenueNotRunning(self.venue()))
        }
    }

    fn order_api(&self) -> Result<&Arc<dyn OrderApi>> {
        self.components
            .orders
            .as_ref()
            .ok_or(Error::TradingDisabled(self.venue()))
    }

    fn reconciler(&self) -> Result<&Arc<Reconciler>> {
        self.reconciler
            .as_ref()
            .ok_or(Error::TradingDisabled(self.venue()))
    }

    /// Count new subscribers; returns topics that just gained their first.
    fn acquire(&self, topics: &[Topic]) -> Vec<Topic> {
        let mut refs = self.market_refs.lock();
        topics
            .iter()
            .filter(|topic| {
                let count = refs.entry((*topic).clone()).or_insert(0);
                *count += 1;
                *count == 1
            })
            .cloned()
            .collect()
    }

    /// Drop subscribers; topics that lost their last one leave the session.
    fn release(&self, topics: &[Topic]) {
        let removed: Vec<Topic> = {
            let mut refs = self.market_refs.lock();
            topics
                .iter()
                .filter(|topic| {
                    let Some(count) = refs.get_mut(*topic) else {
                        return false;
                    };
                    *count -= 1;
                    if *count > 0 {
                        return false;
                    }
                    refs.remove(*topic);
                    true
                })
                .cloned()
                .collect()
        };
        if removed.is_empty() {
            return;
        }
        if let Some(public) = self.running_public() {
            if let Err(e) = public.try_unsubscribe(removed) {
                warn!(venue = %self.venue(), error = %e, "Could not unsubscribe market data");
            }
        }
    }

    fn market_topics(&self) -> Vec<Topic> {
        self.market_refs.lock().keys().cloned().collect()
    }
}

/// Stream of market data for one (venue, instrument) plus the venue's
/// connection topic. Dropping it releases the topics.
pub struct MarketDataStream {
    subscription: Subscription,
    topics: Vec<Topic>,
    slot: Arc<VenueSlot>,
}

impl MarketDataStream {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Market-data topics this stream holds, excluding the connection topic.
    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.subscription.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.subscription.try_recv()
    }
}

impl Drop for MarketDataStream {
    fn drop(&mut self) {
        self.slot.release(&self.topics);
    }
}

pub struct Gateway {
    bus: EventBus,
    orders: Arc<OrderTracker>,
    balances: Arc<BalanceBook>,
    recorder: Option<Recorder>,
    reconnection: ReconnectionConfig,
    order_config: OrdersConfig,
    venues: DashMap<Venue, Arc<VenueSlot>>,
}

impl Gateway {
    pub fn new(bus: EventBus, reconnection: ReconnectionConfig, order_config: OrdersConfig) -> Self {
        Self {
            bus,
            orders: Arc::new(OrderTracker::new(
                order_config.retention(),
                order_config.pending_report_ttl(),
            )),
            balances: Arc::new(BalanceBook::new()),
            recorder: None,
            reconnection,
            order_config,
            venues: DashMap::new(),
        }
    }

    /// Record events, orders and balances. Applies to venues registered afterwards.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn bus_stats(&self) -> BusStats {
        self.bus.stats()
    }

    #[must_use]
    pub fn venues(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.venues.iter().map(|e| *e.key()).collect();
        venues.sort_by_key(|v| v.as_str());
        venues
    }

    pub fn register_venue(&self, components: VenueComponents) -> Result<()> {
        let venue = components.venue;
        if self.venues.contains_key(&venue) {
            return Err(Error::InvalidSubscription(format!("venue {venue} registered twice")));
        }

        let dispatcher = Arc::new(Dispatcher::new(
            venue,
            self.bus.clone(),
            Arc::clone(&self.orders),
            Arc::clone(&self.balances),
            self.recorder.clone(),
        ));
        let reconciler = components.orders.as_ref().map(|api| {
            Arc::new(Reconciler::new(
                Arc::clone(&self.orders),
                Arc::clone(api),
                Arc::clone(&dispatcher),
                self.recorder.clone(),
                self.order_config.reconcile_attempts,
                self.order_config.reconcile_interval(),
            ))
        });

        self.venues.insert(
            venue,
            Arc::new(VenueSlot {
                components,
                dispatcher,
                reconciler,
                runtime: Mutex::new(VenueRuntime::default()),
                market_refs: Mutex::new(HashMap::new()),
            }),
        );
        info!(venue = %venue, "Venue registered");
        Ok(())
    }

    /// Spawn the venue's supervisors and housekeeping. No-op if already running.
    pub fn start(&self, venue: Venue) -> Result<()> {
        let slot = self.slot(venue)?;
        let mut runtime = slot.runtime.lock();
        if runtime.is_running() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let (public, public_handle) = self.supervisor(&slot, &slot.components.public, &cancel);
        tasks.push(tokio::spawn(public.with_topics(slot.market_topics()).run()));

        let private_handle = slot.components.private.as_ref().map(|factory| {
            let (private, handle) = self.supervisor(&slot, factory, &cancel);
            tasks.push(tokio::spawn(
                private
                    .with_topics([Topic::orders(venue), Topic::balances(venue)])
                    .run(),
            ));
            handle
        });

        tasks.push(tokio::spawn(housekeeping(
            Arc::clone(&self.orders),
            slot.reconciler.clone(),
            self.order_config.sweep_interval(),
            cancel.clone(),
        )));

        *runtime = VenueRuntime {
            cancel: Some(cancel),
            tasks,
            public: Some(public_handle),
            private: private_handle,
        };
        info!(venue = %venue, "Venue started");
        Ok(())
    }

    /// Cancel the venue's tasks and wait for them to finish.
    ///
    /// In-flight order calls are not interrupted.
    pub async fn stop(&self, venue: Venue) -> Result<()> {
        let slot = self.slot(venue)?;
        let (cancel, tasks) = {
            let mut runtime = slot.runtime.lock();
            (runtime.cancel.take(), std::mem::take(&mut runtime.tasks))
        };
        let Some(cancel) = cancel else {
            return Ok(());
        };

        cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(venue = %venue, error = %e, "Venue task ended abnormally");
            }
        }
        info!(venue = %venue, "Venue stopped");
        Ok(())
    }

    pub fn start_all(&self) -> Result<()> {
        for venue in self.venues() {
            self.start(venue)?;
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        for venue in self.venues() {
            if let Err(e) = self.stop(venue).await {
                warn!(venue = %venue, error = %e, "Stop failed");
            }
        }
    }

    /// Submit a new order.
    ///
    /// # Errors
    ///
    /// - [`Error::VenueRejected`]: the order is Rejected.
    /// - [`Error::OrderFailed`]: reconciliation found the order never reached the venue.
    /// - [`Error::AmbiguousOutcome`]: the outcome is still unknown; the order
    ///   stays pending and is reconciled in the background.
    /// - Any other error: the order never reached the venue and is Failed.
    pub async fn submit_order(&self, spec: OrderSpec) -> Result<OrderHandle> {
        spec.validate()?;
        let slot = self.slot(spec.venue)?;
        let api = Arc::clone(slot.order_api()?);
        slot.ensure_running()?;

        let now = Utc::now();
        let id = ClientOrderId::generate();
        let mut order = Order::new(&spec, id.clone(), now);
        state::transition(&mut order, OrderState::Submitting { ambiguous: false }, now);
        self.orders.register(order.clone())?;
        self.record_order(&order);
        let handle = OrderHandle {
            venue: spec.venue,
            client_order_id: id.clone(),
        };
        debug!(client_order_id = %id, venue = %spec.venue, "Submitting order");

        match api.place_order(&order).await {
            Ok(ack) => {
                if let Some(venue_id) = ack.venue_order_id {
                    self.orders.set_venue_order_id(&id, venue_id)?;
                }
                let report = ack.report;
                let mut applied = false;
                let order = self.mutate(&id, |o| {
                    let now = Utc::now();
                    if let Some(report) = &report {
                        applied = state::apply_report(o, report, now) == state::ReportEffect::Applied;
                    }
                    if o.state == (OrderState::Submitting { ambiguous: false }) {
                        state::transition(o, OrderState::Acknowledged, now);
                    }
                })?;
                // An inbound report may already have moved the order past the ack.
                if let Some(report) = report.filter(|_| applied) {
                    slot.dispatcher.publish(
                        VenueEvent::new(
                            Topic::orders(spec.venue),
                            report.timestamp,
                            EventPayload::OrderUpdate(report),
                        ),
                        Utc::now(),
                    );
                }
                info!(client_order_id = %id, state = %order.state, "Order accepted");
                Ok(handle)
            }
            Err(e) if e.is_ambiguous() => {
                warn!(client_order_id = %id, error = %e, "Submit outcome unknown, reconciling");
                self.mutate(&id, |o| {
                    state::transition(o, OrderState::Submitting { ambiguous: true }, Utc::now());
                })?;
                let order = slot.reconciler()?.reconcile(&id).await?;
                match order.state {
                    OrderState::Failed => Err(Error::OrderFailed {
                        client_order_id: id,
                        reason: order.reason.unwrap_or_else(|| "not accepted by venue".into()),
                    }),
                    OrderState::Rejected => Err(Error::rejected(
                        "rejected",
                        order.reason.unwrap_or_else(|| "rejected by venue".into()),
                    )),
                    _ => Ok(handle),
                }
            }
            Err(e @ Error::VenueRejected { .. }) => {
                warn!(client_order_id = %id, error = %e, "Order rejected");
                let reason = e.to_string();
                self.mutate(&id, |o| {
                    o.reason = Some(reason);
                    state::transition(o, OrderState::Rejected, Utc::now());
                })?;
                Err(e)
            }
            Err(e) => {
                warn!(client_order_id = %id, error = %e, "Order submission failed");
                let reason = e.to_string();
                self.mutate(&id, |o| {
                    o.reason = Some(reason);
                    state::transition(o, OrderState::Failed, Utc::now());
                })?;
                Err(e)
            }
        }
    }

    /// Ask the venue to cancel. Success means the request was accepted, not
    /// that the order is canceled; a fill may still win.
    pub async fn cancel_order(&self, handle: &OrderHandle) -> Result<()> {
        let slot = self.slot(handle.venue)?;
        let api = Arc::clone(slot.order_api()?);
        slot.ensure_running()?;
        let id = &handle.client_order_id;

        let locator = self.orders.update(id, |o| {
            if o.state.is_terminal() {
                return Err(Error::OrderTerminal {
                    client_order_id: id.clone(),
                    state: o.state,
                });
            }
            if o.state.is_pending_unknown() {
                return Err(Error::AmbiguousOutcome(format!(
                    "order {id} submit outcome unknown; cancel after reconciliation"
                )));
            }
            if o.state != OrderState::CancelRequested && !state::request_cancel(o, Utc::now()) {
                return Err(Error::InvalidOrder(format!("cannot cancel order in state {}", o.state)));
            }
            Ok(o.locator())
        })??;
        if let Some(order) = self.orders.get(id) {
            self.record_order(&order);
        }

        match api.cancel_order(&locator).await {
            Ok(()) => {
                debug!(client_order_id = %id, "Cancel accepted");
                Ok(())
            }
            Err(e) if e.is_ambiguous() => {
                warn!(client_order_id = %id, error = %e, "Cancel outcome unknown, reconciling");
                self.orders.mark_cancel_unresolved(id)?;
                Err(e)
            }
            Err(e) => {
                warn!(client_order_id = %id, error = %e, "Cancel refused");
                let reason = e.to_string();
                self.mutate(id, |o| {
                    state::cancel_refused(o, &reason, Utc::now());
                })?;
                Err(e)
            }
        }
    }

    /// Cancel several orders of one venue in as few calls as it allows.
    ///
    /// Orders that cannot be canceled locally (terminal, unknown, submit
    /// outcome pending) are reported as refused without reaching the venue.
    /// Per-order outcomes follow [`cancel_order`](Self::cancel_order).
    pub async fn cancel_orders(&self, venue: Venue, handles: &[OrderHandle]) -> Result<BatchCancel> {
        let slot = self.slot(venue)?;
        let api = Arc::clone(slot.order_api()?);
        slot.ensure_running()?;
        if let Some(other) = handles.iter().find(|h| h.venue != venue) {
            return Err(Error::InvalidOrder(format!(
                "order {} belongs to {}, not {venue}",
                other.client_order_id, other.venue
            )));
        }

        let mut local = BatchCancel::default();
        let mut locators = Vec::with_capacity(handles.len());
        for handle in handles {
            let id = &handle.client_order_id;
            let requested = self.orders.update(id, |o| {
                if o.state.is_terminal() || o.state.is_pending_unknown() {
                    return None;
                }
                (o.state == OrderState::CancelRequested || state::request_cancel(o, Utc::now()))
                    .then(|| o.locator())
            });
            match requested {
                Ok(Some(locator)) => {
                    if let Some(order) = self.orders.get(id) {
                        self.record_order(&order);
                    }
                    locators.push(locator);
                }
                Ok(None) => local.refused.push((id.clone(), "order cannot be canceled now".into())),
                Err(e) => local.refused.push((id.clone(), e.to_string())),
            }
        }
        if locators.is_empty() {
            return Ok(local);
        }

        match api.cancel_orders(&locators).await {
            Ok(batch) => {
                for (id, reason) in &batch.refused {
                    self.mutate(id, |o| {
                        state::cancel_refused(o, reason, Utc::now());
                    })?;
                }
                for id in &batch.unknown {
                    self.orders.mark_cancel_unresolved(id)?;
                }
                info!(
                    venue = %venue,
                    accepted = batch.accepted.len(),
                    refused = batch.refused.len(),
                    unknown = batch.unknown.len(),
                    "Batch cancel done"
                );
                local.merge(batch);
                Ok(local)
            }
            Err(e) if e.is_ambiguous() => {
                warn!(venue = %venue, error = %e, "Batch cancel outcome unknown, reconciling");
                for locator in &locators {
                    self.orders.mark_cancel_unresolved(&locator.client_order_id)?;
                }
                Err(e)
            }
            Err(e) => {
                warn!(venue = %venue, error = %e, "Batch cancel refused");
                let reason = e.to_string();
                for locator in &locators {
                    self.mutate(&locator.client_order_id, |o| {
                        state::cancel_refused(o, &reason, Utc::now());
                    })?;
                }
                Err(e)
            }
        }
    }

    /// Orders the venue reports open for one instrument, including ones this
    /// process does not track.
    pub async fn venue_open_orders(
        &self,
        venue: Venue,
        instrument: &InstrumentId,
    ) -> Result<Vec<OrderReport>> {
        let slot = self.slot(venue)?;
        let reports = slot.order_api()?.open_orders(instrument).await?;
        let untracked = reports
            .iter()
            .filter(|report| {
                let by_client = report
                    .client_order_id
                    .as_ref()
                    .and_then(|id| self.orders.get(id));
                let by_venue = report
                    .venue_order_id
                    .as_ref()
                    .and_then(|id| self.orders.find_by_venue_id(venue, id));
                by_client.or(by_venue).is_none()
            })
            .count();
        if untracked > 0 {
            info!(venue = %venue, instrument = %instrument, untracked, "Venue has open orders not tracked here");
        }
        Ok(reports)
    }

    /// Cached balance; fetched from the venue on a miss.
    pub async fn query_balance(&self, venue: Venue, asset: impl Into<Asset>) -> Result<Balance> {
        let asset = asset.into();
        if let Some(balance) = self.balances.get(venue, &asset) {
            return Ok(balance);
        }

        let slot = self.slot(venue)?;
        let reports = slot.order_api()?.balances().await?;
        debug!(venue = %venue, count = reports.len(), "Fetched balances");
        for report in &reports {
            if let Some(balance) = self.balances.apply(venue, report) {
                if let Some(recorder) = &self.recorder {
                    recorder.record(Collection::Balances, &balance);
                }
            }
        }
        Ok(self
            .balances
            .get(venue, &asset)
            .unwrap_or_else(|| Balance::zero(venue, asset, Utc::now())))
    }

    /// Subscribe to market data for one instrument.
    ///
    /// `kinds` must be market-data kinds. The stream also receives the venue's
    /// connection events.
    pub async fn subscribe_market_data(
        &self,
        venue: Venue,
        instrument: InstrumentId,
        kinds: &[TopicKind],
    ) -> Result<MarketDataStream> {
        if kinds.is_empty() {
            return Err(Error::InvalidSubscription("no topics requested".into()));
        }
        if let Some(kind) = kinds.iter().find(|k| !k.is_market_data()) {
            return Err(Error::InvalidSubscription(format!(
                "{} is not a market data topic",
                kind.as_str()
            )));
        }
        let slot = self.slot(venue)?;

        let mut topics: Vec<Topic> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let topic = Topic::market(venue, *kind, instrument.clone());
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }

        let subscription = self
            .bus
            .subscribe_all(topics.iter().cloned().chain([Topic::connection(venue)]));
        let added = slot.acquire(&topics);
        let stream = MarketDataStream {
            subscription,
            topics,
            slot: Arc::clone(&slot),
        };

        if !added.is_empty() {
            if let Some(public) = slot.running_public() {
                public.subscribe(added).await?;
            }
        }
        Ok(stream)
    }

    /// Explicit form of dropping the stream.
    pub fn unsubscribe_market_data(&self, stream: MarketDataStream) {
        drop(stream);
    }

    /// Order updates of one venue, plus its connection events.
    pub fn subscribe_orders(&self, venue: Venue) -> Result<Subscription> {
        self.slot(venue)?;
        Ok(self
            .bus
            .subscribe_all([Topic::orders(venue), Topic::connection(venue)]))
    }

    pub fn subscribe_balances(&self, venue: Venue) -> Result<Subscription> {
        self.slot(venue)?;
        Ok(self
            .bus
            .subscribe_all([Topic::balances(venue), Topic::connection(venue)]))
    }

    #[must_use]
    pub fn order(&self, handle: &OrderHandle) -> Option<Order> {
        self.orders.get(&handle.client_order_id)
    }

    #[must_use]
    pub fn open_orders(&self, venue: Venue) -> Vec<Order> {
        self.orders.open_orders(venue)
    }

    pub fn connection_state(&self, venue: Venue) -> Result<VenueConnection> {
        let slot = self.slot(venue)?;
        let runtime = slot.runtime.lock();
        Ok(VenueConnection {
            public: runtime
                .public
                .as_ref()
                .map_or(ConnectionState::Disconnected, SupervisorHandle::state),
            private: runtime.private.as_ref().map(SupervisorHandle::state),
        })
    }

    pub fn top_of_book(&self, venue: Venue, instrument: &InstrumentId) -> Result<Option<TopOfBook>> {
        let slot = self.slot(venue)?;
        let runtime = slot.runtime.lock();
        Ok(runtime
            .public
            .as_ref()
            .and_then(|public| public.books().get(instrument).map(|top| *top.value())))
    }

    /// Malformed frames dropped by a venue's sessions since they last started.
    pub fn dropped_messages(&self, venue: Venue) -> Result<u64> {
        let slot = self.slot(venue)?;
        let runtime = slot.runtime.lock();
        Ok([runtime.public.as_ref(), runtime.private.as_ref()]
            .into_iter()
            .flatten()
            .map(SupervisorHandle::dropped)
            .sum())
    }

    fn slot(&self, venue: Venue) -> Result<Arc<VenueSlot>> {
        self.venues
            .get(&venue)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or(Error::VenueNotRegistered(venue))
    }

    fn supervisor(
        &self,
        slot: &VenueSlot,
        factory: &SessionFactory,
        cancel: &CancellationToken,
    ) -> (SessionSupervisor<Box<dyn WireSession>>, SupervisorHandle) {
        SessionSupervisor::new(
            factory(),
            NormalizationPipeline::new(Arc::clone(&slot.components.normalizer)),
            Arc::clone(&slot.dispatcher),
            self.reconnection.clone(),
            cancel.child_token(),
        )
    }

    fn mutate(&self, id: &ClientOrderId, f: impl FnOnce(&mut Order)) -> Result<Order> {
        let order = self.orders.update(id, |o| {
            f(o);
            o.clone()
        })?;
        self.record_order(&order);
        Ok(order)
    }

    fn record_order(&self, order: &Order) {
        if let Some(recorder) = &self.recorder {
            recorder.record(Collection::Orders, order);
        }
    }
}

/// Periodic reconciliation of ambiguous orders and eviction of old ones.
async fn housekeeping(
    orders: Arc<OrderTracker>,
    reconciler: Option<Arc<Reconciler>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(reconciler) = &reconciler {
                    reconciler.sweep().await;
                }
                let stats = orders.sweep(Instant::now());
                if stats.evicted_orders > 0 || stats.expired_reports > 0 {
                    debug!(
                        evicted = stats.evicted_orders,
                        expired_reports = stats.expired_reports,
                        "Order housekeeping"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("venues", &self.venues())
            .field("orders", &self.orders.len())
            .finish_non_exhaustive()
    }
}
