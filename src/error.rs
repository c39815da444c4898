use std::time::Duration;

use thiserror::Error;

use crate::domain::id::ClientOrderId;
use crate::domain::order::OrderState;
use crate::domain::venue::{RateCategory, Venue};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("missing credentials for trading venue {venue}: set {variable}")]
    MissingCredentials {
        venue: Venue,
        variable: &'static str,
    },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Connection-level failure. Handled by the supervisor, never surfaced to strategies.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed on {venue}: {reason}")]
    Auth { venue: Venue, reason: String },

    #[error("rate limited on {category} requests, retry after {retry_after:?}")]
    RateLimited {
        category: RateCategory,
        retry_after: Duration,
    },

    #[error("venue rejected request ({code}): {message}")]
    VenueRejected { code: String, message: String },

    /// The outcome of a side-effecting call is unknown and must be resolved by query.
    #[error("ambiguous outcome: {0}")]
    AmbiguousOutcome(String),

    #[error("failed to normalize {venue} message: {reason}")]
    Normalization { venue: Venue, reason: String },

    #[error("invalid instrument '{0}', expected BASE/QUOTE")]
    InvalidInstrument(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("order {0} not found")]
    OrderNotFound(ClientOrderId),

    #[error("order {client_order_id} is already {state}")]
    OrderTerminal {
        client_order_id: ClientOrderId,
        state: OrderState,
    },

    #[error("order {client_order_id} failed: {reason}")]
    OrderFailed {
        client_order_id: ClientOrderId,
        reason: String,
    },

    #[error("venue {0} is not registered")]
    VenueNotRegistered(Venue),

    #[error("venue {0} is not running")]
    VenueNotRunning(Venue),

    #[error("venue {0} has no trading credentials configured")]
    TradingDisabled(Venue),

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    pub fn normalization(venue: Venue, reason: impl Into<String>) -> Self {
        Self::Normalization {
            venue,
            reason: reason.into(),
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VenueRejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True for errors whose side effect may or may not have happened at the venue.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousOutcome(_))
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}
