//! Venue ports: wire sessions, order execution and message translation.
//!
//! Each venue variant implements these traits independently. The gateway
//! composes them without knowing which venue sits behind a trait object.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use crate::domain::SessionChannel;
use crate::domain::{
    BalanceReport, ClientOrderId, InstrumentId, Order, OrderLocator, OrderReport, Topic, Venue,
    VenueEvent, VenueOrderId,
};
use crate::error::Result;

/// Behavioral differences between venue sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCapabilities {
    /// Subscribing to a book topic delivers a fresh snapshot without asking.
    pub snapshot_on_subscribe: bool,
    /// Interval at which the client must send its own keepalive, if any.
    pub ping_interval: Option<Duration>,
    /// Maximum silence before the session is considered degraded.
    pub heartbeat_timeout: Duration,
}

/// One frame received from a venue, undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub venue: Venue,
    pub received_at: DateTime<Utc>,
    /// Decoded text body (decompressed when the venue compresses frames).
    pub body: String,
    /// Instrument a REST-sourced frame was requested for.
    pub context: Option<InstrumentId>,
}

impl RawFrame {
    pub fn new(venue: Venue, body: impl Into<String>) -> Self {
        Self {
            venue,
            received_at: Utc::now(),
            body: body.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, instrument: InstrumentId) -> Self {
        self.context = Some(instrument);
        self
    }
}

/// Item produced by a session's inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    Frame(RawFrame),
    /// Protocol-level keepalive already handled by the session.
    Keepalive,
    Disconnected { reason: String },
}

/// A single streaming session with one venue.
///
/// The inbound sequence is infinite and restartable only by reconnecting:
/// after `Disconnected` or `None`, the owner must call [`connect`](Self::connect)
/// again. `next_message` must be cancel safe.
#[async_trait]
pub trait WireSession: Send {
    fn venue(&self) -> Venue;

    fn channel(&self) -> SessionChannel;

    fn capabilities(&self) -> SessionCapabilities;

    /// Open the transport. Drops any previous connection.
    async fn connect(&mut self) -> Result<()>;

    /// Run the venue's authentication handshake. No-op for public sessions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`](crate::error::Error::Auth) when the venue refuses
    /// the credentials; this is never retried here.
    async fn authenticate(&mut self) -> Result<()>;

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()>;

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()>;

    /// Ask the venue for a fresh full book. The snapshot arrives on the inbound stream.
    async fn request_snapshot(&mut self, instrument: &InstrumentId) -> Result<()>;

    /// Send whatever the venue needs to keep the session alive.
    async fn keepalive(&mut self) -> Result<()>;

    async fn next_message(&mut self) -> Option<RawMessage>;

    async fn close(&mut self);
}

#[async_trait]
impl WireSession for Box<dyn WireSession> {
    fn venue(&self) -> Venue {
        (**self).venue()
    }

    fn channel(&self) -> SessionChannel {
        (**self).channel()
    }

    fn capabilities(&self) -> SessionCapabilities {
        (**self).capabilities()
    }

    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        (**self).authenticate().await
    }

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()> {
        (**self).subscribe(topics).await
    }

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()> {
        (**self).unsubscribe(topics).await
    }

    async fn request_snapshot(&mut self, instrument: &InstrumentId) -> Result<()> {
        (**self).request_snapshot(instrument).await
    }

    async fn keepalive(&mut self) -> Result<()> {
        (**self).keepalive().await
    }

    async fn next_message(&mut self) -> Option<RawMessage> {
        (**self).next_message().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

/// Factory for fresh sessions of one channel.
pub type SessionFactory = Arc<dyn Fn() -> Box<dyn WireSession> + Send + Sync>;

/// Response to a successful order placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceAck {
    pub venue_order_id: Option<VenueOrderId>,
    /// Full order status, for venues that return one on placement.
    pub report: Option<OrderReport>,
}

/// Result of a reconciliation query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Found(OrderReport),
    NotFound,
}

/// Per-order outcome of a batch cancel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchCancel {
    pub accepted: Vec<ClientOrderId>,
    /// Refused by the venue, with its reason.
    pub refused: Vec<(ClientOrderId, String)>,
    /// The venue may or may not have acted.
    pub unknown: Vec<ClientOrderId>,
}

impl BatchCancel {
    pub fn merge(&mut self, other: BatchCancel) {
        self.accepted.extend(other.accepted);
        self.refused.extend(other.refused);
        self.unknown.extend(other.unknown);
    }
}

/// Order execution over a venue's REST API.
///
/// Side-effecting calls fail with
/// [`Error::AmbiguousOutcome`](crate::error::Error::AmbiguousOutcome) when the
/// venue may or may not have acted on them.
#[async_trait]
pub trait OrderApi: Send + Sync {
    fn venue(&self) -> Venue;

    async fn place_order(&self, order: &Order) -> Result<PlaceAck>;

    async fn cancel_order(&self, order: &OrderLocator) -> Result<()>;

    async fn query_order(&self, order: &OrderLocator) -> Result<QueryOutcome>;

    /// Orders the venue still has working for one instrument, whoever placed them.
    async fn open_orders(&self, instrument: &InstrumentId) -> Result<Vec<OrderReport>>;

    /// Cancel several orders. Venues without a batch endpoint cancel one at a time.
    async fn cancel_orders(&self, orders: &[OrderLocator]) -> Result<BatchCancel> {
        let mut batch = BatchCancel::default();
        for order in orders {
            let id = order.client_order_id.clone();
            match self.cancel_order(order).await {
                Ok(()) => batch.accepted.push(id),
                Err(e) if e.is_ambiguous() => batch.unknown.push(id),
                Err(e) => batch.refused.push((id, e.to_string())),
            }
        }
        Ok(batch)
    }

    async fn balances(&self) -> Result<Vec<BalanceReport>>;
}

/// Pure translation of one venue frame into unsequenced events.
///
/// Unknown or control frames yield an empty vector. Malformed frames yield
/// [`Error::Normalization`](crate::error::Error::Normalization).
pub trait Normalizer: Send + Sync {
    fn venue(&self) -> Venue;

    fn normalize(&self, frame: &RawFrame) -> Result<Vec<VenueEvent>>;
}
