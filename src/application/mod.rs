//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! to implement the gateway's use cases.

pub mod balance;
pub mod book;
pub mod bus;
pub mod dispatch;
pub mod gateway;
pub mod normalize;
pub mod order;
pub mod reconcile;
pub mod recorder;
pub mod sequencer;
pub mod supervisor;

pub use bus::{BusStats, Delivery, EventBus, Subscription};
pub use gateway::{Gateway, MarketDataStream, OrderHandle, VenueComponents, VenueConnection};
pub use supervisor::{SessionCommand, SessionSupervisor, SupervisorHandle};
