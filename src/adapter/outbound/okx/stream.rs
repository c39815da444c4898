//! OKX WebSocket sessions.
//!
//! The venue drops connections that stay silent for 30 seconds, so both
//! sessions send a text `ping` on every keepalive tick and report the `pong`
//! as a keepalive. `books` sends a full snapshot on every subscribe; a
//! snapshot request is an unsubscribe followed by a fresh subscribe.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::auth::OkxAuth;
use super::message::{
    ChannelArg, EventReply, OpRequest, ACCOUNT_CHANNEL, BOOKS_CHANNEL, ORDERS_CHANNEL,
    TRADES_CHANNEL,
};
use crate::adapter::outbound::websocket::{WsConnection, WsFrame};
use crate::domain::{InstrumentId, SessionChannel, Topic, TopicKind, Venue};
use crate::error::{Error, Result};
use crate::port::{RawFrame, RawMessage, SessionCapabilities, WireSession};

const VENUE: Venue = Venue::Okx;

/// Below the venue's 30 second idle cut-off.
pub const PING_INTERVAL: Duration = Duration::from_secs(25);

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

fn public_arg(topic: &Topic) -> Option<ChannelArg> {
    let instrument = topic.instrument.as_ref()?;
    match topic.kind {
        TopicKind::Trades => Some(ChannelArg::instrument(TRADES_CHANNEL, instrument)),
        TopicKind::Book => Some(ChannelArg::instrument(BOOKS_CHANNEL, instrument)),
        _ => None,
    }
}

fn private_arg(topic: &Topic) -> Option<ChannelArg> {
    match topic.kind {
        TopicKind::Orders => Some(ChannelArg::account(ORDERS_CHANNEL)),
        TopicKind::Balances => Some(ChannelArg::account(ACCOUNT_CHANNEL)),
        _ => None,
    }
}

fn to_message(frame: WsFrame) -> RawMessage {
    match frame {
        WsFrame::Text(text) if text == "pong" => RawMessage::Keepalive,
        WsFrame::Text(text) => RawMessage::Frame(RawFrame::new(VENUE, text)),
        WsFrame::Binary(bytes) => {
            RawMessage::Frame(RawFrame::new(VENUE, String::from_utf8_lossy(&bytes)))
        }
        WsFrame::Control => RawMessage::Keepalive,
        WsFrame::Closed(reason) => RawMessage::Disconnected { reason },
    }
}

async fn send_op(ws: &mut WsConnection, op: &'static str, args: Vec<ChannelArg>) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }
    debug!(venue = %VENUE, op, ?args, "Sending channel request");
    ws.send_json(&OpRequest { op, args }).await
}

/// Market data session.
pub struct OkxPublicSession {
    ws: WsConnection,
    heartbeat_timeout: Duration,
}

impl OkxPublicSession {
    pub fn new(url: &str, heartbeat_timeout: Duration) -> Self {
        Self {
            ws: WsConnection::new(url),
            heartbeat_timeout,
        }
    }
}

#[async_trait]
impl WireSession for OkxPublicSession {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn channel(&self) -> SessionChannel {
        SessionChannel::Public
    }

    fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            snapshot_on_subscribe: true,
            ping_interval: Some(PING_INTERVAL),
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
        send_op(&mut self.ws, "subscribe", topics.iter().filter_map(public_arg).collect()).await
    }

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()> {
        send_op(&mut self.ws, "unsubscribe", topics.iter().filter_map(public_arg).collect()).await
    }

    async fn request_snapshot(&mut self, instrument: &InstrumentId) -> Result<()> {
        let arg = ChannelArg::instrument(BOOKS_CHANNEL, instrument);
        send_op(&mut self.ws, "unsubscribe", vec![arg.clone()]).await?;
        send_op(&mut self.ws, "subscribe", vec![arg]).await
    }

    async fn keepalive(&mut self) -> Result<()> {
        self.ws.send_text("ping").await
    }

    async fn next_message(&mut self) -> Option<RawMessage> {
        Some(to_message(self.ws.next_frame().await))
    }

    async fn close(&mut self) {
        self.ws.close().await;
    }
}

/// Account session carrying order and balance pushes.
pub struct OkxPrivateSession {
    ws: WsConnection,
    auth: OkxAuth,
    heartbeat_timeout: Duration,
    pending: VecDeque<RawMessage>,
}

impl OkxPrivateSession {
    pub fn new(url: &str, auth: OkxAuth, heartbeat_timeout: Duration) -> Self {
        Self {
            ws: WsConnection::new(url),
            auth,
            heartbeat_timeout,
            pending: VecDeque::new(),
        }
    }

    async fn await_login(&mut self) -> Result<()> {
        loop {
            let text = match self.ws.next_frame().await {
                WsFrame::Text(text) => text,
                WsFrame::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                WsFrame::Control => continue,
                WsFrame::Closed(reason) => {
                    return Err(Error::Transport(format!("closed during login: {reason}")))
                }
            };
            match serde_json::from_str::<EventReply>(&text) {
                Ok(reply) if reply.event == "login" => {
                    return match reply.code.as_deref() {
                        Some("0") | None => Ok(()),
                        Some(code) => Err(Error::Auth {
                            venue: VENUE,
                            reason: format!("{code}: {}", reply.msg.unwrap_or_default()),
                        }),
                    };
                }
                // Login failures arrive as plain error events
                Ok(reply) if reply.event == "error" => {
                    return Err(Error::Auth {
                        venue: VENUE,
                        reason: format!(
                            "{}: {}",
                            reply.code.unwrap_or_default(),
                            reply.msg.unwrap_or_default()
                        ),
                    });
                }
                _ => self
                    .pending
                    .push_back(RawMessage::Frame(RawFrame::new(VENUE, text))),
            }
        }
    }
}

#[async_trait]
impl WireSession for OkxPrivateSession {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn channel(&self) -> SessionChannel {
        SessionChannel::Private
    }

    fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            snapshot_on_subscribe: false,
            ping_interval: Some(PING_INTERVAL),
            heartbeat_timeout: self.heartbeat_timeout,
        }
    }

    async fn connect(&mut self) -> Result<()> {
        self.pending.clear();
        self.ws.connect().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        let login = self.auth.login(Utc::now().timestamp());
        self.ws
            .send_json(&OpRequest {
                op: "login",
                args: vec![login],
            })
            .await?;
        tokio::time::timeout(LOGIN_TIMEOUT, self.await_login())
            .await
            .map_err(|_| Error::Transport("timed out waiting for login reply".into()))??;
        info!(venue = %VENUE, "Private stream logged in");
        Ok(())
    }

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()> {
        if let Some(topic) = topics.iter().find(|t| private_arg(t).is_none()) {
            return Err(Error::InvalidSubscription(format!(
                "{topic} is not served by the private session"
            )));
        }
        send_op(&mut self.ws, "subscribe", topics.iter().filter_map(private_arg).collect()).await
    }

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()> {
        send_op(&mut self.ws, "unsubscribe", topics.iter().filter_map(private_arg).collect()).await
    }

    async fn request_snapshot(&mut self, _instrument: &InstrumentId) -> Result<()> {
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        self.ws.send_text("ping").await
    }

    async fn next_message(&mut self) -> Option<RawMessage> {
        if let Some(message) = self.pending.pop_front() {
            return Some(message);
        }
        Some(to_message(self.ws.next_frame().await))
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
    fn test_topic_args() {
        let btc = InstrumentId::new("BTC", "USDT");
        assert_eq!(
            public_arg(&Topic::book(VENUE, btc.clone())),
            Some(ChannelArg::instrument(BOOKS_CHANNEL, &btc))
        );
        assert_eq!(public_arg(&Topic::orders(VENUE)), None);
        assert_eq!(
            private_arg(&Topic::orders(VENUE)).map(|arg| arg.inst_type),
            Some(Some("SPOT".to_string()))
        );
        assert_eq!(
            private_arg(&Topic::balances(VENUE)).map(|arg| arg.channel),
            Some("account".to_string())
        );
    }

    #[test]
    fn test_pong_is_keepalive() {
        assert_eq!(to_message(WsFrame::Text("pong".into())), RawMessage::Keepalive);
        assert!(matches!(
            to_message(WsFrame::Text("{}".into())),
            RawMessage::Frame(_)
        ));
    }

    #[test]
    fn test_login_request_shape() {
        let auth = OkxAuth::new(&crate::infrastructure::config::venue::Credentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
            passphrase: Some("pass".into()),
        })
        .unwrap();
        let request = OpRequest {
            op: "login",
            args: vec![auth.login(1_538_054_050)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "login");
        assert_eq!(json["args"][0]["apiKey"], "key");
        assert_eq!(json["args"][0]["passphrase"], "pass");
        assert_eq!(json["args"][0]["timestamp"], "1538054050");
    }
}
