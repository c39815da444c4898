//! Factory modules for building infrastructure components.
//!
//! Provides factory functions that construct fully-configured components
//! from application configuration.
//!
//! # Submodules
//!
//! - [`venue`] - Venue adapter construction, chosen by venue kind
//! - [`gateway`] - Event bus, bridge, recorder and gateway wiring

pub mod gateway;
pub mod venue;

pub use gateway::build_gateway;
pub use venue::venue_components;
