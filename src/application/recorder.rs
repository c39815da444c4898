//! Fire-and-forget recording of events, orders and balances.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::port::{Collection, RecordStore};

/// Handle for queuing records. Never blocks and never fails the caller.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::Sender<(Collection, serde_json::Value)>,
    failures: Arc<AtomicU64>,
}

impl Recorder {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn RecordStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<(Collection, serde_json::Value)>(capacity.max(1));
        let failures = Arc::new(AtomicU64::new(0));
        let task_failures = Arc::clone(&failures);

        let handle = tokio::spawn(async move {
            while let Some((collection, record)) = rx.recv().await {
                if let Err(e) = store.append(collection, record).await {
                    task_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(collection = %collection, error = %e, "Record append failed");
                }
            }
            debug!("Recorder stopped");
        });

        (Self { tx, failures }, handle)
    }

    pub fn record<T: Serialize>(&self, collection: Collection, value: &T) {
        let record = match serde_json::to_value(value) {
            Ok(record) => record,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(collection = %collection, error = %e, "Record serialization failed");
                return;
            }
        };
        if let Err(e) = self.tx.try_send((collection, record)) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(collection = %collection, error = %e, "Recorder queue unavailable, record dropped");
        }
    }

    /// Records dropped or failed so far.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
