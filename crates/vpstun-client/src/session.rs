//! SSH session launching

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vpstun_bridge::SshCommand;
use vpstun_process::{ManagedProcess, ProcessSpec};

use crate::error::SessionError;

/// How a session ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// SSH exited with status 0
    Ended,
    /// The cancellation token fired and the session was stopped
    Cancelled,
}

/// Runs one tunnel session to completion
#[async_trait]
pub trait SessionLauncher: Send {
    /// Run `command` until it exits or `cancel` fires
    async fn run_session(
        &mut self,
        command: &SshCommand,
        cancel: &CancellationToken,
    ) -> Result<SessionExit, SessionError>;
}

/// Launches the real `ssh` client
///
/// SSH inherits our stdout/stderr so its diagnostics land in the service log.
#[derive(Debug, Clone)]
pub struct SshLauncher {
    grace: Duration,
}

impl SshLauncher {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

#[async_trait]
impl SessionLauncher for SshLauncher {
    async fn run_session(
        &mut self,
        command: &SshCommand,
        cancel: &CancellationToken,
    ) -> Result<SessionExit, SessionError> {
        let spec = ProcessSpec::new("ssh", &command.program).args(command.argv());
        let mut process = ManagedProcess::spawn(spec).map_err(SessionError::Spawn)?;
        info!(pid = ?process.pid(), "Starting SSH session to {}", command.target);

        let exited = tokio::select! {
            result = process.wait() => Some(result),
            _ = cancel.cancelled() => None,
        };

        let Some(result) = exited else {
            info!("Stopping SSH session");
            let outcome = process.stop(self.grace).await;
            debug!("SSH stopped: {:?}", outcome);
            return Ok(SessionExit::Cancelled);
        };

        // Already exited; this only reaps the handle
        process.stop(self.grace).await;

        let status = result.map_err(SessionError::Wait)?;
        if status.success() {
            Ok(SessionExit::Ended)
        } else {
            Err(SessionError::Exited {
                code: status.code(),
            })
        }
    }
}
