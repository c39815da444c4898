//! External broker bridge port.

use async_trait::async_trait;

use crate::domain::CanonicalEvent;
use crate::error::Result;

/// Forwards canonical events to an external message broker.
///
/// Failures are reported to the caller, which logs them; they never affect
/// in-process delivery.
#[async_trait]
pub trait EventBridge: Send + Sync {
    /// Bridge name for logging.
    fn name(&self) -> &'static str;

    /// Publish one event under the given broker subject.
    async fn forward(&self, subject: &str, event: &CanonicalEvent) -> Result<()>;
}
