//! Huobi spot integration.

pub mod auth;
pub mod client;
pub mod message;
pub mod stream;

use std::sync::Arc;

use self::auth::HuobiAuth;
use self::client::HuobiClient;
use self::message::HuobiNormalizer;
use self::stream::{HuobiPrivateSession, HuobiPublicSession};
use crate::adapter::outbound::http::RestClient;
use crate::application::VenueComponents;
use crate::error::Result;
use crate::infrastructure::config::venue::VenueConfig;
use crate::port::{OrderApi, SessionFactory, WireSession};

/// Wire up sessions, order API and normalizer from venue settings.
pub fn components(config: &VenueConfig) -> Result<VenueComponents> {
    let rest = Arc::new(RestClient::from_config(config)?);
    let auth = config.credentials.as_ref().map(HuobiAuth::new).transpose()?;
    let heartbeat = config.heartbeat_timeout();

    let public: SessionFactory = {
        let url = config.public_ws_url().to_string();
        Arc::new(move || Box::new(HuobiPublicSession::new(&url, heartbeat)) as Box<dyn WireSession>)
    };
    let private: Option<SessionFactory> = auth.clone().map(|auth| {
        let url = config.private_ws_url().to_string();
        Arc::new(move || {
            Box::new(HuobiPrivateSession::new(&url, auth.clone(), heartbeat)) as Box<dyn WireSession>
        }) as SessionFactory
    });
    let orders = match auth {
        Some(auth) if config.trading => {
            Some(Arc::new(HuobiClient::new(rest, Some(auth))) as Arc<dyn OrderApi>)
        }
        _ => None,
    };

    Ok(VenueComponents {
        venue: config.kind,
        normalizer: Arc::new(HuobiNormalizer),
        public,
        private,
        orders,
    })
}
