//! A venue wired from scripted sessions and a scripted order API.

use std::sync::Arc;

use tradewire::application::{Gateway, VenueComponents};
use tradewire::domain::{ConnectionState, SessionChannel, Venue};
use tradewire::port::OrderApi;
use tradewire::testkit::order_api::ScriptedOrderApi;
use tradewire::testkit::session::{ScriptNormalizer, SessionScript};

use super::wait_for;

pub struct ScriptedVenue {
    pub venue: Venue,
    pub public: SessionScript,
    pub private: SessionScript,
    pub api: Arc<ScriptedOrderApi>,
}

impl ScriptedVenue {
    pub fn new(venue: Venue) -> Self {
        Self::with_api(ScriptedOrderApi::new(venue))
    }

    pub fn with_api(api: ScriptedOrderApi) -> Self {
        let venue = api.venue();
        Self {
            venue,
            public: SessionScript::new(venue, SessionChannel::Public),
            private: SessionScript::new(venue, SessionChannel::Private),
            api: Arc::new(api),
        }
    }

    pub fn components(&self) -> VenueComponents {
        let api: Arc<dyn OrderApi> = self.api.clone();
        VenueComponents {
            venue: self.venue,
            normalizer: Arc::new(ScriptNormalizer::new(self.venue)),
            public: self.public.factory(),
            private: Some(self.private.factory()),
            orders: Some(api),
        }
    }

    /// Register and start the venue, returning once both sessions are subscribed.
    pub async fn start(&self, gateway: &Gateway) {
        gateway.register_venue(self.components()).unwrap();
        gateway.start(self.venue).unwrap();
        wait_for("sessions subscribed", || {
            let state = gateway.connection_state(self.venue).unwrap();
            state.public == ConnectionState::Subscribed
                && state.private == Some(ConnectionState::Subscribed)
        })
        .await;
    }
}
