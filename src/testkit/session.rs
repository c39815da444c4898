//! Scripted [`WireSession`] for supervisor and gateway tests.
//!
//! A [`SessionScript`] owns the shared state: queued connect/auth/subscribe
//! results (each defaults to `Ok(())` when exhausted), the inbound message
//! queue the test pushes into, and a log of every call the supervisor made.
//! Sessions created from one script share all of it, so a factory can hand
//! out fresh sessions across restarts while the test keeps one handle.
//!
//! Inbound frames use a tiny text protocol decoded by [`ScriptNormalizer`]:
//! `trade:BASE/QUOTE`, `order:{json OrderReport}`, `balance:{json BalanceReport}`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::domain;
use crate::domain::{
    BalanceReport, EventPayload, InstrumentId, OrderReport, SessionChannel, Topic, Venue,
    VenueEvent,
};
use crate::error::{Error, Result};
use crate::port::{
    Normalizer, RawFrame, RawMessage, SessionCapabilities, SessionFactory, WireSession,
};

#[derive(Debug, Default)]
struct SessionLog {
    connects: u32,
    auths: u32,
    subscribed: Vec<Vec<Topic>>,
    unsubscribed: Vec<Vec<Topic>>,
    snapshots: Vec<InstrumentId>,
    keepalives: u32,
    closes: u32,
}

struct Shared {
    venue: Venue,
    channel: SessionChannel,
    capabilities: Mutex<SessionCapabilities>,
    connect_results: Mutex<VecDeque<Result<()>>>,
    auth_results: Mutex<VecDeque<Result<()>>>,
    subscribe_results: Mutex<VecDeque<Result<()>>>,
    inbound_tx: mpsc::UnboundedSender<RawMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RawMessage>>,
    log: Mutex<SessionLog>,
}

/// Test-side handle: push inbound messages, inspect calls.
#[derive(Clone)]
pub struct SessionScript {
    shared: Arc<Shared>,
}

impl SessionScript {
    pub fn new(venue: Venue, channel: SessionChannel) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                venue,
                channel,
                capabilities: Mutex::new(SessionCapabilities {
                    snapshot_on_subscribe: false,
                    ping_interval: None,
                    heartbeat_timeout: Duration::from_secs(30),
                }),
                connect_results: Mutex::new(VecDeque::new()),
                auth_results: Mutex::new(VecDeque::new()),
                subscribe_results: Mutex::new(VecDeque::new()),
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
                log: Mutex::new(SessionLog::default()),
            }),
        }
    }

    pub fn session(&self) -> ScriptedSession {
        ScriptedSession {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Factory handing out sessions bound to this script.
    pub fn factory(&self) -> SessionFactory {
        let script = self.clone();
        Arc::new(move || Box::new(script.session()) as Box<dyn WireSession>)
    }

    pub fn push(&self, message: RawMessage) {
        let _ = self.shared.inbound_tx.send(message);
    }

    pub fn push_frame(&self, frame: RawFrame) {
        self.push(RawMessage::Frame(frame));
    }

    pub fn disconnect(&self, reason: &str) {
        self.push(RawMessage::Disconnected {
            reason: reason.to_string(),
        });
    }

    pub fn connects(&self) -> u32 {
        self.shared.log.lock().connects
    }

    pub fn auths(&self) -> u32 {
        self.shared.log.lock().auths
    }

    /// Topic lists passed to each `subscribe` call, in order.
    pub fn subscribed(&self) -> Vec<Vec<Topic>> {
        self.shared.log.lock().subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<Vec<Topic>> {
        self.shared.log.lock().unsubscribed.clone()
    }

    pub fn snapshot_requests(&self) -> Vec<InstrumentId> {
        self.shared.log.lock().snapshots.clone()
    }

    pub fn keepalives(&self) -> u32 {
        self.shared.log.lock().keepalives
    }

    pub fn closes(&self) -> u32 {
        self.shared.log.lock().closes
    }
}

/// Session whose behavior is driven by its [`SessionScript`].
pub struct ScriptedSession {
    shared: Arc<Shared>,
}

impl ScriptedSession {
    pub fn new(venue: Venue, channel: SessionChannel) -> (Self, SessionScript) {
        let script = SessionScript::new(venue, channel);
        (script.session(), script)
    }

    pub fn with_heartbeat(self, timeout: Duration) -> Self {
        self.shared.capabilities.lock().heartbeat_timeout = timeout;
        self
    }

    pub fn with_capabilities(self, capabilities: SessionCapabilities) -> Self {
        *self.shared.capabilities.lock() = capabilities;
        self
    }

    pub fn with_connect_results(self, results: Vec<Result<()>>) -> Self {
        *self.shared.connect_results.lock() = results.into();
        self
    }

    pub fn with_auth_results(self, results: Vec<Result<()>>) -> Self {
        *self.shared.auth_results.lock() = results.into();
        self
    }

    pub fn with_subscribe_results(self, results: Vec<Result<()>>) -> Self {
        *self.shared.subscribe_results.lock() = results.into();
        self
    }
}

#[async_trait]
impl WireSession for ScriptedSession {
    fn venue(&self) -> Venue {
        self.shared.venue
    }

    fn channel(&self) -> SessionChannel {
        self.shared.channel
    }

    fn capabilities(&self) -> SessionCapabilities {
        *self.shared.capabilities.lock()
    }

    async fn connect(&mut self) -> Result<()> {
        self.shared.log.lock().connects += 1;
        self.shared.connect_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn authenticate(&mut self) -> Result<()> {
        self.shared.log.lock().auths += 1;
        self.shared.auth_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()> {
        self.shared.log.lock().subscribed.push(topics.to_vec());
        self.shared
            .subscribe_results
            .lock()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()> {
        self.shared.log.lock().unsubscribed.push(topics.to_vec());
        Ok(())
    }

    async fn request_snapshot(&mut self, instrument: &InstrumentId) -> Result<()> {
        self.shared.log.lock().snapshots.push(instrument.clone());
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        self.shared.log.lock().keepalives += 1;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<RawMessage> {
        self.shared.inbound_rx.lock().await.recv().await
    }

    async fn close(&mut self) {
        self.shared.log.lock().closes += 1;
    }
}

/// Decodes the scripted text protocol.
pub struct ScriptNormalizer {
    venue: Venue,
}

impl ScriptNormalizer {
    pub fn new(venue: Venue) -> Self {
        Self { venue }
    }
}

impl Normalizer for ScriptNormalizer {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn normalize(&self, frame: &RawFrame) -> Result<Vec<VenueEvent>> {
        let (kind, rest) = frame
            .body
            .split_once(':')
            .ok_or_else(|| Error::normalization(self.venue, "missing frame kind"))?;
        let event = match kind {
            "trade" => VenueEvent::new(
                Topic::trades(self.venue, rest.parse()?),
                None,
                domain::trade_payload(),
            ),
            "order" => VenueEvent::new(
                Topic::orders(self.venue),
                None,
                EventPayload::OrderUpdate(serde_json::from_str(rest)?),
            ),
            "balance" => VenueEvent::new(
                Topic::balances(self.venue),
                None,
                EventPayload::BalanceUpdate(serde_json::from_str(rest)?),
            ),
            other => {
                return Err(Error::normalization(
                    self.venue,
                    format!("unknown frame kind {other}"),
                ))
            }
        };
        Ok(vec![event])
    }
}

pub fn trade_frame(venue: Venue, symbol: &str) -> RawFrame {
    RawFrame::new(venue, format!("trade:{symbol}"))
}

pub fn order_frame(venue: Venue, report: &OrderReport) -> RawFrame {
    let body = serde_json::to_string(report).unwrap_or_default();
    RawFrame::new(venue, format!("order:{body}"))
}

pub fn balance_frame(venue: Venue, report: &BalanceReport) -> RawFrame {
    let body = serde_json::to_string(report).unwrap_or_default();
    RawFrame::new(venue, format!("balance:{body}"))
}
