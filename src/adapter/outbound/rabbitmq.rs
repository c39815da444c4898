//! RabbitMQ bridge over the management HTTP publish API.
//!
//! Each event is published to the configured exchange with the broker
//! subject as routing key and the JSON-encoded event as payload.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::outbound::http::encode_component;
use crate::domain::CanonicalEvent;
use crate::error::{Error, Result};
use crate::infrastructure::config::settings::BrokerConfig;
use crate::port::EventBridge;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    properties: serde_json::Map<String, serde_json::Value>,
    routing_key: &'a str,
    payload: String,
    payload_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

pub struct RabbitMqBridge {
    http: HttpClient,
    publish_url: String,
    username: String,
    password: Option<String>,
}

impl RabbitMqBridge {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let http = HttpClient::builder().timeout(PUBLISH_TIMEOUT).build()?;
        Ok(Self {
            http,
            publish_url: publish_url(config),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

fn publish_url(config: &BrokerConfig) -> String {
    format!(
        "{}/api/exchanges/{}/{}/publish",
        config.url.trim_end_matches('/'),
        encode_component(&config.vhost),
        encode_component(&config.exchange),
    )
}

#[async_trait]
impl EventBridge for RabbitMqBridge {
    fn name(&self) -> &'static str {
        "rabbitmq"
    }

    async fn forward(&self, subject: &str, event: &CanonicalEvent) -> Result<()> {
        let request = PublishRequest {
            properties: serde_json::Map::new(),
            routing_key: subject,
            payload: serde_json::to_string(event)?,
            payload_encoding: "string",
        };
        let response = self
            .http
            .post(&self.publish_url)
            .basic_auth(&self.username, self.password.as_deref())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("broker publish failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("broker answered {status}: {body}")));
        }
        let outcome: PublishResponse = response.json().await?;
        if !outcome.routed {
            debug!(subject, "Broker had no queue bound for subject");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vhost: &str) -> BrokerConfig {
        BrokerConfig {
            url: "http://localhost:15672/".into(),
            vhost: vhost.into(),
            exchange: "tradewire.events".into(),
            username: "guest".into(),
            password: None,
        }
    }

    #[test]
    fn test_default_vhost_is_encoded() {
        assert_eq!(
            publish_url(&config("/")),
            "http://localhost:15672/api/exchanges/%2F/tradewire.events/publish"
        );
        assert_eq!(
            publish_url(&config("prod")),
            "http://localhost:15672/api/exchanges/prod/tradewire.events/publish"
        );
    }

    #[test]
    fn test_publish_request_shape() {
        let request = PublishRequest {
            properties: serde_json::Map::new(),
            routing_key: "binance.trades.BTC/USDT",
            payload: "{}".into(),
            payload_encoding: "string",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["routing_key"], "binance.trades.BTC/USDT");
        assert_eq!(json["payload_encoding"], "string");
        assert!(json["properties"].as_object().unwrap().is_empty());
    }
}
