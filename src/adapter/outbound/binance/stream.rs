//! Binance WebSocket sessions.
//!
//! The public session subscribes `<symbol>@trade` and `<symbol>@depth@100ms`
//! streams and fetches book snapshots over REST; the snapshot body is queued
//! ahead of the socket so it flows through the same inbound sequence. The
//! private session opens a user-data listen key and subscribes to it as a
//! stream name; the key is refreshed on every keepalive tick and deleted on
//! close.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::client::BinanceClient;
use super::message::StreamRequest;
use crate::adapter::outbound::codec;
use crate::adapter::outbound::websocket::{WsConnection, WsFrame};
use crate::domain::{InstrumentId, SessionChannel, Topic, TopicKind, Venue};
use crate::error::{Error, Result};
use crate::port::{RawFrame, RawMessage, SessionCapabilities, WireSession};

const VENUE: Venue = Venue::Binance;

/// Listen keys expire after an hour without a refresh.
pub const LISTEN_KEY_REFRESH: Duration = Duration::from_secs(30 * 60);

fn stream_name(topic: &Topic) -> Option<String> {
    let symbol = codec::concatenated(topic.instrument.as_ref()?).to_ascii_lowercase();
    match topic.kind {
        TopicKind::Trades => Some(format!("{symbol}@trade")),
        TopicKind::Book => Some(format!("{symbol}@depth@100ms")),
        _ => None,
    }
}

fn to_message(frame: WsFrame) -> RawMessage {
    match frame {
        WsFrame::Text(text) => RawMessage::Frame(RawFrame::new(VENUE, text)),
        WsFrame::Binary(bytes) => {
            RawMessage::Frame(RawFrame::new(VENUE, String::from_utf8_lossy(&bytes)))
        }
        WsFrame::Control => RawMessage::Keepalive,
        WsFrame::Closed(reason) => RawMessage::Disconnected { reason },
    }
}

/// Market data session.
pub struct BinancePublicSession {
    ws: WsConnection,
    client: Arc<BinanceClient>,
    heartbeat_timeout: Duration,
    next_id: u64,
    pending: VecDeque<RawMessage>,
}

impl BinancePublicSession {
    pub fn new(url: &str, client: Arc<BinanceClient>, heartbeat_timeout: Duration) -> Self {
        Self {
            ws: WsConnection::new(url),
            client,
            heartbeat_timeout,
            next_id: 0,
            pending: VecDeque::new(),
        }
    }

    async fn send_request(&mut self, method: &str, params: Vec<String>) -> Result<()> {
        if params.is_empty() {
            return Ok(());
        }
        self.next_id += 1;
        debug!(venue = %VENUE, method, streams = ?params, "Sending stream request");
        let request = StreamRequest {
            method,
            params,
            id: self.next_id,
        };
        self.ws.send_json(&request).await
    }
}

#[async_trait]
impl WireSession for BinancePublicSession {
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
        self.pending.clear();
        self.ws.connect().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()> {
        let streams = topics.iter().filter_map(stream_name).collect();
        self.send_request("SUBSCRIBE", streams).await
    }

    async fn unsubscribe(&mut self, topics: &[Topic]) -> Result<()> {
        let streams = topics.iter().filter_map(stream_name).collect();
        self.send_request("UNSUBSCRIBE", streams).await
    }

    async fn request_snapshot(&mut self, instrument: &InstrumentId) -> Result<()> {
        let body = self.client.depth_snapshot(instrument).await?;
        debug!(venue = %VENUE, instrument = %instrument, "Book snapshot fetched");
        self.pending.push_back(RawMessage::Frame(
            RawFrame::new(VENUE, body).with_context(instrument.clone()),
        ));
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        Ok(())
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

/// User-data session carrying execution reports and balance changes.
pub struct BinancePrivateSession {
    ws: WsConnection,
    client: Arc<BinanceClient>,
    heartbeat_timeout: Duration,
    listen_key: Option<String>,
    next_id: u64,
}

impl BinancePrivateSession {
    pub fn new(url: &str, client: Arc<BinanceClient>, heartbeat_timeout: Duration) -> Self {
        Self {
            ws: WsConnection::new(url),
            client,
            heartbeat_timeout,
            listen_key: None,
            next_id: 0,
        }
    }
}

#[async_trait]
impl WireSession for BinancePrivateSession {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn channel(&self) -> SessionChannel {
        SessionChannel::Private
    }

    fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            snapshot_on_subscribe: false,
            ping_interval: Some(LISTEN_KEY_REFRESH),
            heartbeat_timeout: self.heartbeat_timeout,
        }
    }

    async fn connect(&mut self) -> Result<()> {
        self.listen_key = None;
        self.ws.connect().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        let listen_key = self.client.create_listen_key().await?;
        self.next_id += 1;
        let request = StreamRequest {
            method: "SUBSCRIBE",
            params: vec![listen_key.clone()],
            id: self.next_id,
        };
        self.ws.send_json(&request).await?;
        info!(venue = %VENUE, "Subscribed to user data stream");
        self.listen_key = Some(listen_key);
        Ok(())
    }

    async fn subscribe(&mut self, topics: &[Topic]) -> Result<()> {
        // Orders and balances both arrive on the listen-key stream
        if let Some(topic) = topics.iter().find(|t| t.kind.is_market_data()) {
            return Err(Error::InvalidSubscription(format!(
                "{topic} is not served by the private session"
            )));
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, _topics: &[Topic]) -> Result<()> {
        Ok(())
    }

    async fn request_snapshot(&mut self, _instrument: &InstrumentId) -> Result<()> {
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        match &self.listen_key {
            Some(key) => self.client.keepalive_listen_key(key).await,
            None => Ok(()),
        }
    }

    async fn next_message(&mut self) -> Option<RawMessage> {
        Some(to_message(self.ws.next_frame().await))
    }

    async fn close(&mut self) {
        if let Some(key) = self.listen_key.take() {
            if let Err(e) = self.client.delete_listen_key(&key).await {
                warn!(venue = %VENUE, error = %e, "Failed to close user data stream");
            }
        }
        self.ws.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names() {
        let btc = InstrumentId::new("BTC", "USDT");
        assert_eq!(
            stream_name(&Topic::trades(VENUE, btc.clone())).as_deref(),
            Some("btcusdt@trade")
        );
        assert_eq!(
            stream_name(&Topic::book(VENUE, btc)).as_deref(),
            Some("btcusdt@depth@100ms")
        );
        assert_eq!(stream_name(&Topic::orders(VENUE)), None);
    }

    #[test]
    fn test_frames_map_to_messages() {
        assert!(matches!(
            to_message(WsFrame::Text("{}".into())),
            RawMessage::Frame(frame) if frame.body == "{}" && frame.venue == VENUE
        ));
        assert_eq!(to_message(WsFrame::Control), RawMessage::Keepalive);
        assert_eq!(
            to_message(WsFrame::Closed("bye".into())),
            RawMessage::Disconnected {
                reason: "bye".into()
            }
        );
    }

    #[test]
    fn test_subscription_request_shape() {
        let request = StreamRequest {
            method: "SUBSCRIBE",
            params: vec!["btcusdt@trade".into()],
            id: 1,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"method":"SUBSCRIBE","params":["btcusdt@trade"],"id":1}"#
        );
    }

    #[tokio::test]
    async fn test_close_deletes_listen_key() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        use crate::adapter::outbound::binance::auth::BinanceAuth;
        use crate::adapter::outbound::http::RestClient;
        use crate::infrastructure::config::venue::Credentials;
        use crate::infrastructure::rate_limit::RateLimiter;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let rest = RestClient::new(
            VENUE,
            reqwest::Client::new(),
            &format!("http://{addr}"),
            RateLimiter::new(VENUE, &[], Duration::from_secs(1)),
        );
        let auth = BinanceAuth::new(&Credentials {
            api_key: "key-1".into(),
            api_secret: "secret".into(),
            passphrase: None,
        })
        .unwrap();
        let client = Arc::new(BinanceClient::new(Arc::new(rest), Some(auth)));
        let mut session = BinancePrivateSession::new("wss://unused", client, Duration::from_secs(30));
        session.listen_key = Some("lk-1".into());

        session.close().await;

        let request = server.await.unwrap();
        assert!(
            request.starts_with("DELETE /api/v3/userDataStream?listenKey=lk-1 "),
            "{request}"
        );
        assert!(request.to_ascii_lowercase().contains("x-mbx-apikey: key-1"));
        assert!(session.listen_key.is_none());
    }
}
