//! Order state machine: transitions and the live order table.

pub mod state;
pub mod tracker;

pub use tracker::{InboundOutcome, OrderTracker, SweepStats};
