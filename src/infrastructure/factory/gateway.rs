//! Gateway factory: event bus, optional broker bridge and record store, and
//! every configured venue.

use std::sync::Arc;

use tracing::{info, warn};

use super::venue::venue_components;
use crate::adapter::outbound::jsonl::JsonLinesStore;
use crate::adapter::outbound::rabbitmq::RabbitMqBridge;
use crate::application::recorder::Recorder;
use crate::application::{EventBus, Gateway};
use crate::error::Result;
use crate::infrastructure::config::settings::Config;
use crate::port::{EventBridge, RecordStore};

/// Build the event bus, bridging to the broker when one is configured.
pub fn build_bus(config: &Config) -> Result<EventBus> {
    let Some(broker) = &config.broker else {
        return Ok(EventBus::new(config.bus.subscriber_capacity));
    };
    if broker.password.is_none() {
        warn!(url = %broker.url, "BROKER_PASSWORD not set, publishing without a password");
    }
    let bridge: Arc<dyn EventBridge> = Arc::new(RabbitMqBridge::new(broker)?);
    info!(url = %broker.url, exchange = %broker.exchange, "Broker bridge enabled");
    Ok(EventBus::with_bridge(
        config.bus.subscriber_capacity,
        config.bus.bridge_capacity,
        bridge,
    ))
}

/// Build a gateway with every configured venue registered but not started.
///
/// Must be called inside a Tokio runtime: the bridge and recorder tasks are
/// spawned here.
pub async fn build_gateway(config: &Config) -> Result<Gateway> {
    let bus = build_bus(config)?;
    let mut gateway = Gateway::new(bus, config.reconnection.clone(), config.orders.clone());

    if let Some(store_config) = &config.store {
        let store: Arc<dyn RecordStore> = Arc::new(JsonLinesStore::open(&store_config.path).await?);
        let (recorder, _task) = Recorder::spawn(store, store_config.channel_capacity);
        gateway = gateway.with_recorder(recorder);
    }

    for venue in &config.venues {
        gateway.register_venue(venue_components(venue)?)?;
        info!(venue = %venue.kind, trading = venue.trading, "Venue registered");
    }
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Venue;

    #[tokio::test]
    async fn test_build_gateway_registers_configured_venues() {
        let config = Config::parse_toml_with_env(
            r#"
            [[venues]]
            kind = "binance"

            [[venues]]
            kind = "huobi"
            "#,
            |_| None,
        )
        .unwrap();
        let gateway = build_gateway(&config).await.unwrap();
        let mut venues = gateway.venues();
        venues.sort();
        assert_eq!(venues, vec![Venue::Binance, Venue::Huobi]);
    }

    #[tokio::test]
    async fn test_store_section_enables_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[store]\npath = \"{}\"\n",
            dir.path().join("records").display()
        );
        let config = Config::parse_toml_with_env(&toml, |_| None).unwrap();
        build_gateway(&config).await.unwrap();
        assert!(dir.path().join("records").is_dir());
    }
}
