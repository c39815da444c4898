//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe infrastructure dependencies: venue sessions and
//! REST APIs, the external broker bridge, and the record store.

pub mod bridge;
pub mod store;
pub mod venue;
