//! Infrastructure configuration modules.

pub mod logging;
pub mod reconnect;
pub mod settings;
pub mod venue;

pub use settings::Config;
