//! OKX spot integration.

pub mod auth;
pub mod client;
pub mod message;
pub mod stream;

use std::sync::Arc;

use self::auth::OkxAuth;
use self::client::OkxClient;
use self::message::OkxNormalizer;
use self::stream::{OkxPrivateSession, OkxPublicSession};
use crate::adapter::outbound::http::RestClient;
use crate::application::VenueComponents;
use crate::error::Result;
use crate::infrastructure::config::venue::VenueConfig;
use crate::port::{OrderApi, SessionFactory, WireSession};

/// Wire up sessions, order API and normalizer from venue settings.
pub fn components(config: &VenueConfig) -> Result<VenueComponents> {
    let auth = config.credentials.as_ref().map(OkxAuth::new).transpose()?;
    let heartbeat = config.heartbeat_timeout();

    let public: SessionFactory = {
        let url = config.public_ws_url().to_string();
        Arc::new(move || Box::new(OkxPublicSession::new(&url, heartbeat)) as Box<dyn WireSession>)
    };
    let private: Option<SessionFactory> = auth.clone().map(|auth| {
        let url = config.private_ws_url().to_string();
        Arc::new(move || {
            Box::new(OkxPrivateSession::new(&url, auth.clone(), heartbeat)) as Box<dyn WireSession>
        }) as SessionFactory
    });
    let orders = match auth {
        Some(auth) if config.trading => {
            let rest = Arc::new(RestClient::from_config(config)?);
            Some(Arc::new(OkxClient::new(rest, auth)) as Arc<dyn OrderApi>)
        }
        _ => None,
    };

    Ok(VenueComponents {
        venue: config.kind,
        normalizer: Arc::new(OkxNormalizer),
        public,
        private,
        orders,
    })
}
