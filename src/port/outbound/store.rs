//! Record store port for append-only history.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Record collections written by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Events,
    Orders,
    Balances,
}

impl Collection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Orders => "orders",
            Self::Balances => "balances",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrow append/query interface to an external document store.
///
/// The core only appends; reads exist for offline analysis and tests.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(&self, collection: Collection, record: Value) -> Result<()>;

    /// Most recent records of a collection, oldest first.
    async fn recent(&self, collection: Collection, limit: usize) -> Result<Vec<Value>>;
}
