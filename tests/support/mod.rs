#![allow(dead_code)]

pub mod venue;

use std::time::Duration;

use tradewire::application::{EventBus, Gateway};
use tradewire::testkit::config;

/// Gateway over a plain bus with fast reconnection and reconciliation.
pub fn gateway(capacity: usize) -> Gateway {
    Gateway::new(EventBus::new(capacity), config::reconnection(), config::orders())
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
