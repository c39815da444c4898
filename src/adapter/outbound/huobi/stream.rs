//! Huobi WebSocket sessions.
//!
//! Market frames are gzip-compressed and the venue pings at the application
//! level; both sessions answer pings themselves and report them upward as
//! keepalives. Book snapshots are requested on the socket with `req` and
//! arrive as an ordinary frame.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::auth::{self, HuobiAuth};
use super::message::{
    self, ActionPing, ActionReply, ActionRequest, MarketPing, MarketRequest,
};
use crate::adapter::outbound::websocket::{gunzip_text, WsConnection, WsFrame};
use crate::domain::{InstrumentId, SessionChannel, Topic, TopicKind, Venue};
use crate::error::{Error, Result};
use crate::port::{RawFrame, RawMessage, SessionCapabilities, WireSession};

const VENUE: Venue = Venue::Huobi;

/// Bound on the wait for the `auth` reply.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

fn market_channel(topic: &Topic) -> Option<String> {
    let instrument = topic.instrument.as_ref()?;
    match topic.kind {
        TopicKind::Trades => Some(message::trade_channel(instrument)),
        TopicKind::Book => Some(message::mbp_channel(instrument)),
        _ => None,
    }
}

fn private_channel(topic: &Topic) -> Option<&'static str> {
    match topic.kind {
        TopicKind::Orders => Some(message::ORDERS_CHANNEL),
        TopicKind::Balances => Some(message::ACCOUNTS_CHANNEL),
        _ => None,
    }
}

/// Market data session.
pub struct HuobiPublicSession {
    ws: WsConnection,
    heartbeat_timeout: Duration,
    next_id: u64,
}

impl HuobiPublicSession {
    pub fn new(url: &str, heartbeat_timeout: Duration) -> Self {
        Self {
            ws: WsConnection::new(url),
            heartbeat_timeout,
            next_id: 0,
        }
    }

    fn request_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    async fn send(&mut self, request: MarketRequest) -> Result<()> {
        debug!(venue = %VENUE, ?request, "Sending market request");
        self.ws.send_json(&request).await
    }
}

#[async_trait]
impl WireSession for HuobiPublicSession {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn channel(&self) -> SessionChannel {
        SessionChannel::Public
    }

    fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            snapshot_on_subscribe: false,
            ping_interval: None,
            heartbeat_timeout: self.heartbeat_timeout,
        }
    }

    async fn connect(&mut self) -> Result<()> {
        self.ws.connect().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()> {
        for channel in topics.iter().filter_map(market_channel) {
            let id = self.request_id();
            self.send(MarketRequest {
                sub: Some(channel),
                unsub: None,
                req: None,
                id,
            })
            .await?;
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()> {
        for channel in topics.iter().filter_map(market_channel) {
            let id = self.request_id();
            self.send(MarketRequest {
                sub: None,
                unsub: Some(channel),
                req: None,
                id,
            })
            .await?;
        }
        Ok(())
    }

    async fn request_snapshot(&mut self, instrument: &InstrumentId) -> Result<()> {
        let id = self.request_id();
        self.send(MarketRequest {
            sub: None,
            unsub: None,
            req: Some(message::mbp_channel(instrument)),
            id,
        })
        .await
    }

    async fn keepalive(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_message(&mut self) -> Option<RawMessage> {
        loop {
            let text = match self.ws.next_frame().await {
                WsFrame::Binary(bytes) => match gunzip_text(&bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(venue = %VENUE, error = %e, "Dropping undecodable frame");
                        continue;
                    }
                },
                WsFrame::Text(text) => text,
                WsFrame::Control => return Some(RawMessage::Keepalive),
                WsFrame::Closed(reason) => return Some(RawMessage::Disconnected { reason }),
            };
            if let Ok(ping) = serde_json::from_str::<MarketPing>(&text) {
                if let Err(e) = self.ws.send_json(&json!({ "pong": ping.ping })).await {
                    return Some(RawMessage::Disconnected {
                        reason: format!("pong failed: {e}"),
                    });
                }
                return Some(RawMessage::Keepalive);
            }
            return Some(RawMessage::Frame(RawFrame::new(VENUE, text)));
        }
    }

    async fn close(&mut self) {
        self.ws.close().await;
    }
}

/// v2 account session carrying order and balance pushes.
pub struct HuobiPrivateSession {
    ws: WsConnection,
    auth: HuobiAuth,
    heartbeat_timeout: Duration,
    pending: VecDeque<RawMessage>,
}

impl HuobiPrivateSession {
    pub fn new(url: &str, auth: HuobiAuth, heartbeat_timeout: Duration) -> Self {
        Self {
            ws: WsConnection::new(url),
            auth,
            heartbeat_timeout,
            pending: VecDeque::new(),
        }
    }

    /// Answer an action ping. Returns false if `text` was not one.
    async fn answer_ping(&mut self, text: &str) -> Result<bool> {
        match serde_json::from_str::<ActionPing>(text) {
            Ok(ping) if ping.action == "ping" => {
                self.ws
                    .send_json(&json!({ "action": "pong", "data": { "ts": ping.data.ts } }))
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn await_auth_reply(&mut self) -> Result<()> {
        loop {
            let text = match self.ws.next_frame().await {
                WsFrame::Text(text) => text,
                WsFrame::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                WsFrame::Control => continue,
                WsFrame::Closed(reason) => {
                    return Err(Error::Transport(format!("closed during auth: {reason}")))
                }
            };
            if self.answer_ping(&text).await? {
                continue;
            }
            match serde_json::from_str::<ActionReply>(&text) {
                Ok(reply) if reply.action == "req" && reply.ch.as_deref() == Some("auth") => {
                    return match reply.code {
                        Some(200) => Ok(()),
                        code => Err(Error::Auth {
                            venue: VENUE,
                            reason: format!(
                                "code {}: {}",
                                code.unwrap_or_default(),
                                reply.message.unwrap_or_default()
                            ),
                        }),
                    };
                }
                _ => self
                    .pending
                    .push_back(RawMessage::Frame(RawFrame::new(VENUE, text))),
            }
        }
    }

    async fn send_action(&mut self, action: &str, topics: &[Topic]) -> Result<()> {
        for ch in topics.iter().filter_map(private_channel) {
            debug!(venue = %VENUE, action, ch, "Sending private request");
            self.ws.send_json(&ActionRequest { action, ch }).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WireSession for HuobiPrivateSession {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn channel(&self) -> SessionChannel {
        SessionChannel::Private
    }

    fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            snapshot_on_subscribe: false,
            ping_interval: None,
            heartbeat_timeout: self.heartbeat_timeout,
        }
    }

    async fn connect(&mut self) -> Result<()> {
        self.pending.clear();
        self.ws.connect().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        let url = Url::parse(self.ws.url())?;
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let request = self
            .auth
            .ws_auth_request(&host, url.path(), &auth::timestamp(Utc::now()));
        self.ws.send_json(&request).await?;

        tokio::time::timeout(AUTH_TIMEOUT, self.await_auth_reply())
            .await
            .map_err(|_| Error::Transport("timed out waiting for auth reply".into()))??;
        info!(venue = %VENUE, "Private stream authenticated");
        Ok(())
    }

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()> {
        if let Some(topic) = topics.iter().find(|t| private_channel(t).is_none()) {
            return Err(Error::InvalidSubscription(format!(
                "{topic} is not served by the private session"
            )));
        }
        self.send_action("sub", topics).await
    }

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()> {
        self.send_action("unsub", topics).await
    }

    async fn request_snapshot(&mut self, _instrument: &InstrumentId) -> Result<()> {
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_message(&mut self) -> Option<RawMessage> {
        if let Some(message) = self.pending.pop_front() {
            return Some(message);
        }
        let text = match self.ws.next_frame().await {
            WsFrame::Text(text) => text,
            WsFrame::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            WsFrame::Control => return Some(RawMessage::Keepalive),
            WsFrame::Closed(reason) => return Some(RawMessage::Disconnected { reason }),
        };
        match self.answer_ping(&text).await {
            Ok(true) => Some(RawMessage::Keepalive),
            Ok(false) => Some(RawMessage::Frame(RawFrame::new(VENUE, text))),
            Err(e) => Some(RawMessage::Disconnected {
                reason: format!("pong failed: {e}"),
            }),
        }
    }

    async fn close(&mut self) {
        self.pending.clear();
        self.ws.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_channels() {
        let btc = InstrumentId::new("BTC", "USDT");
        assert_eq!(
            market_channel(&Topic::trades(VENUE, btc.clone())).as_deref(),
            Some("market.btcusdt.trade.detail")
        );
        assert_eq!(
            market_channel(&Topic::book(VENUE, btc)).as_deref(),
            Some("market.btcusdt.mbp.150")
        );
        assert_eq!(market_channel(&Topic::orders(VENUE)), None);
    }

    #[test]
    fn test_private_channels() {
        assert_eq!(private_channel(&Topic::orders(VENUE)), Some("orders#*"));
        assert_eq!(
            private_channel(&Topic::balances(VENUE)),
            Some("accounts.update#1")
        );
        assert_eq!(
            private_channel(&Topic::trades(VENUE, InstrumentId::new("BTC", "USDT"))),
            None
        );
    }

    #[test]
    fn test_market_request_omits_unused_keys() {
        let request = MarketRequest {
            sub: Some("market.btcusdt.trade.detail".into()),
            unsub: None,
            req: None,
            id: "1".into(),
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"sub":"market.btcusdt.trade.detail","id":"1"}"#
        );
    }

    #[test]
    fn test_ping_shapes() {
        assert_eq!(
            serde_json::from_str::<MarketPing>(r#"{"ping":1492420473027}"#)
                .unwrap()
                .ping,
            1_492_420_473_027
        );
        let ping: ActionPing =
            serde_json::from_str(r#"{"action":"ping","data":{"ts":1575537778295}}"#).unwrap();
        assert_eq!(ping.data.ts, 1_575_537_778_295);
        assert!(serde_json::from_str::<MarketPing>(r#"{"ch":"market.btcusdt.trade.detail"}"#).is_err());
    }
}
