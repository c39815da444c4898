//! Venue adapter factory.

use crate::adapter::outbound::{binance, huobi, okx};
use crate::application::VenueComponents;
use crate::domain::Venue;
use crate::error::Result;
use crate::infrastructure::config::venue::VenueConfig;

/// Build the sessions, order API and normalizer for one configured venue.
pub fn venue_components(config: &VenueConfig) -> Result<VenueComponents> {
    match config.kind {
        Venue::Binance => binance::components(config),
        Venue::Huobi => huobi::components(config),
        Venue::Okx => okx::components(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::venue::Credentials;

    #[test]
    fn test_public_only_venue_has_no_private_side() {
        for kind in [Venue::Binance, Venue::Huobi, Venue::Okx] {
            let components = venue_components(&VenueConfig::new(kind)).unwrap();
            assert_eq!(components.venue, kind);
            assert!(components.private.is_none());
            assert!(components.orders.is_none());
            assert_eq!(components.normalizer.venue(), kind);
        }
    }

    #[test]
    fn test_credentials_enable_private_session() {
        let mut venue = VenueConfig::new(Venue::Okx);
        venue.trading = true;
        venue.credentials = Some(Credentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
            passphrase: Some("pass".into()),
        });
        let components = venue_components(&venue).unwrap();
        assert!(components.private.is_some());
        assert!(components.orders.is_some());

        let session = (components.public)();
        assert_eq!(session.venue(), Venue::Okx);
    }
}
