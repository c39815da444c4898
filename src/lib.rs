//! Tradewire - venue connectivity and event dispatch for automated crypto trading.
//!
//! The crate keeps long-lived WebSocket sessions to several exchanges, turns
//! their venue-specific frames into one canonical event model, fans those
//! events out over an in-process bus and tracks every order through a single
//! lifecycle state machine. Strategies talk to one [`application::Gateway`]
//! and never see a venue wire format.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **`domain`** - Venue-agnostic types: instruments, topics, canonical
//!   events, order books, orders and balances
//! - **`port`** - Traits at the venue, broker and store seams
//! - **`application`** - Session supervision, normalization, book
//!   synchronization, the event bus, order tracking and the gateway facade
//! - **`adapter`** - Binance, Huobi and OKX integrations, the RabbitMQ bridge
//!   and the JSON-lines record store
//! - **`infrastructure`** - Configuration, rate limiting and wiring
//!
//! # Example
//!
//! ```no_run
//! use tradewire::infrastructure::config::Config;
//! use tradewire::infrastructure::factory::build_gateway;
//!
//! # async fn run() -> tradewire::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let gateway = build_gateway(&config).await?;
//! gateway.start_all()?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
