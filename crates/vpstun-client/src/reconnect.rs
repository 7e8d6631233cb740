//! Reconnection delay with cancellation

use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reconnection errors
#[derive(Debug, Error)]
pub enum ReconnectError {
    #[error("Reconnection cancelled")]
    Cancelled,
}

/// Fixed-delay reconnection pacing
///
/// There is no attempt limit: the tunnel is retried until cancelled.
#[derive(Debug)]
pub struct ReconnectManager {
    delay: Duration,
    attempt: usize,
}

impl ReconnectManager {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    /// Wait before the next reconnection attempt
    ///
    /// Returns early with [`ReconnectError::Cancelled`] once `cancel` fires.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<(), ReconnectError> {
        self.attempt += 1;

        debug!(
            "Waiting {:?} before reconnection attempt {}",
            self.delay, self.attempt
        );

        tokio::select! {
            _ = sleep(self.delay) => Ok(()),
            _ = cancel.cancelled() => Err(ReconnectError::Cancelled),
        }
    }

    /// Get current attempt number
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
