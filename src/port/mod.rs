//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the extension points in the hexagonal architecture.
//! Adapters implement them to integrate venues, brokers and stores.
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │                         │
//!     ┌──────────────┤  Domain + Port          ├──────────────┐
//!     │              │                         │              │
//!     │              └─────────────────────────┘              │
//!     │                         │                             │
//!     ▼                         ▼                             ▼
//! ┌─────────┐            ┌─────────────┐              ┌───────────┐
//! │  Venue  │            │   Record    │              │  Broker   │
//! │ Adapter │            │   Store     │              │  Bridge   │
//! └─────────┘            └─────────────┘              └───────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`WireSession`], [`OrderApi`], [`Normalizer`] - Venue integration
//! - [`EventBridge`] - External broker forwarding
//! - [`RecordStore`] - Append-only history

pub mod outbound;

pub use outbound::bridge::EventBridge;
pub use outbound::store::{Collection, RecordStore};
pub use outbound::venue::{
    BatchCancel, Normalizer, OrderApi, PlaceAck, QueryOutcome, RawFrame, RawMessage, SessionCapabilities,
    SessionChannel, SessionFactory, WireSession,
};
