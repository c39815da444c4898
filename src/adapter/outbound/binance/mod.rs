//! Binance spot integration.

pub mod auth;
pub mod client;
pub mod message;
pub mod stream;

use std::sync::Arc;

use self::auth::BinanceAuth;
use self::client::BinanceClient;
use self::message::BinanceNormalizer;
use self::stream::{BinancePrivateSession, BinancePublicSession};
use crate::adapter::outbound::http::RestClient;
use crate::application::VenueComponents;
use crate::error::Result;
use crate::infrastructure::config::venue::VenueConfig;
use crate::port::{OrderApi, SessionFactory, WireSession};

/// Wire up sessions, order API and normalizer from venue settings.
pub fn components(config: &VenueConfig) -> Result<VenueComponents> {
    let rest = Arc::new(RestClient::from_config(config)?);
    let auth = config.credentials.as_ref().map(BinanceAuth::new).transpose()?;
    let has_auth = auth.is_some();
    let client = Arc::new(BinanceClient::new(rest, auth));
    let heartbeat = config.heartbeat_timeout();

    let public: SessionFactory = {
        let client = Arc::clone(&client);
        let url = config.public_ws_url().to_string();
        Arc::new(move || {
            Box::new(BinancePublicSession::new(&url, Arc::clone(&client), heartbeat))
                as Box<dyn WireSession>
        })
    };
    let private: Option<SessionFactory> = has_auth.then(|| {
        let client = Arc::clone(&client);
        let url = config.private_ws_url().to_string();
        Arc::new(move || {
            Box::new(BinancePrivateSession::new(&url, Arc::clone(&client), heartbeat))
                as Box<dyn WireSession>
        }) as SessionFactory
    });
    let orders = (config.trading && has_auth).then(|| client as Arc<dyn OrderApi>);

    Ok(VenueComponents {
        venue: config.kind,
        normalizer: Arc::new(BinanceNormalizer),
        public,
        private,
        orders,
    })
}
