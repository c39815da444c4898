//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`session`] - `ScriptedSession`, a [`WireSession`](crate::port::WireSession)
//!   driven from the test through a `SessionScript` handle.
//! - [`order_api`] - `ScriptedOrderApi` with queued placement and query results.
//! - [`bridge`] - `RecordingBridge`, an [`EventBridge`](crate::port::EventBridge)
//!   that remembers what it was asked to forward.
//! - [`domain`] - Builders for domain primitives: topics, events, orders, reports.
//! - [`config`] - Canonical test configurations.

pub mod bridge;
pub mod config;
pub mod domain;
pub mod order_api;
pub mod session;
