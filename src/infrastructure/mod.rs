//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! business logic: configuration loading, rate limiting and component wiring.
//!
//! # Submodules
//!
//! - [`config`] - Configuration loading and validation
//! - [`factory`] - Component factory functions
//! - [`rate_limit`] - Per-venue token buckets

pub mod config;
pub mod factory;
pub mod rate_limit;
