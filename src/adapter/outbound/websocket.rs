//! WebSocket transport shared by every venue session.
//!
//! Wraps one `tokio-tungstenite` stream. Protocol pings are answered by
//! tungstenite itself (the pong is queued and flushed on the next read or
//! write), so reading stays cancel safe: a frame is either returned or left
//! in the stream.

use std::io::Read;

use flate2::read::GzDecoder;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Protocol ping or pong.
    Control,
    Closed(String),
}

/// One WebSocket connection to a fixed URL, reopened on [`connect`](Self::connect).
pub struct WsConnection {
    url: String,
    stream: Option<WsStream>,
}

impl WsConnection {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the connection, dropping any previous one.
    pub async fn connect(&mut self) -> Result<()> {
        self.stream = None;
        info!(url = %self.url, "Connecting to WebSocket");
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Transport(format!("connect {}: {e}", self.url)))?;
        info!(url = %self.url, status = %response.status(), "WebSocket connected");
        self.stream = Some(stream);
        Ok(())
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Transport("WebSocket is not connected".into()))?;
        trace!(bytes = text.len(), "Sending WebSocket text frame");
        stream
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    pub async fn send_json<T: serde::Serialize>(&mut self, message: &T) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.send_text(text).await
    }

    /// Next inbound frame. `Closed` once the stream has ended; the
    /// connection must be reopened before reading again.
    pub async fn next_frame(&mut self) -> WsFrame {
        let Some(stream) = self.stream.as_mut() else {
            return WsFrame::Closed("not connected".into());
        };
        let frame = match stream.next().await {
            Some(Ok(Message::Text(text))) => WsFrame::Text(text),
            Some(Ok(Message::Binary(bytes))) => WsFrame::Binary(bytes),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => WsFrame::Control,
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "closed by venue".to_string(),
                    |f| format!("closed by venue: {} {}", f.code, f.reason),
                );
                WsFrame::Closed(reason)
            }
            Some(Err(e)) => {
                warn!(url = %self.url, error = %e, "WebSocket error");
                WsFrame::Closed(e.to_string())
            }
            None => WsFrame::Closed("stream ended".into()),
        };
        if matches!(frame, WsFrame::Closed(_)) {
            self.stream = None;
        }
        frame
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(url = %self.url, error = %e, "WebSocket close failed");
            }
        }
    }
}

/// Inflate a gzip-compressed frame into text.
pub fn gunzip_text(bytes: &[u8]) -> Result<String> {
    let mut text = String::new();
    GzDecoder::new(bytes).read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    #[test]
    fn test_gunzip_text() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"ping":1}"#).unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(gunzip_text(&compressed).unwrap(), r#"{"ping":1}"#);
    }

    #[test]
    fn test_gunzip_rejects_plain_bytes() {
        assert!(gunzip_text(b"not gzip").is_err());
    }

    #[tokio::test]
    async fn test_reading_unconnected_reports_closed() {
        let mut ws = WsConnection::new("wss://example.invalid/ws");
        assert!(!ws.is_open());
        assert!(matches!(ws.next_frame().await, WsFrame::Closed(_)));
        assert!(ws.send_text("x").await.is_err());
    }
}
