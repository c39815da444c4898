//! Recording [`EventBridge`] for bus tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::CanonicalEvent;
use crate::error::{Error, Result};
use crate::port::EventBridge;

/// Remembers forwarded subjects; optionally fails every forward.
#[derive(Default)]
pub struct RecordingBridge {
    subjects: Mutex<Vec<String>>,
    attempts: AtomicU32,
    fail: bool,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge whose broker is always unreachable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().clone()
    }
}

#[async_trait]
impl EventBridge for RecordingBridge {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn forward(&self, subject: &str, _event: &CanonicalEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Transport("broker unreachable".into()));
        }
        self.subjects.lock().push(subject.to_string());
        Ok(())
    }
}
