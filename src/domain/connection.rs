use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state of one venue session, owned by its supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    /// A heartbeat deadline was missed; a reconnect follows after backoff.
    Degraded,
    /// Terminal. Entered on shutdown or when authentication is exhausted.
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a venue's streaming API a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionChannel {
    /// Market data; no authentication.
    Public,
    /// Order and balance updates; authenticated.
    Private,
}

impl SessionChannel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}
