//! Supervisor and session errors

use thiserror::Error;
use vpstun_bridge::BridgeError;
use vpstun_process::ProcessError;

/// Startup failures; each one ends the run
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Setup failed: {0}")]
    Setup(#[from] ProcessError),

    #[error("Bridge setup failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Bridge health check failed: {0}")]
    BridgeHealth(#[source] ProcessError),
}

/// Why an SSH session ended without being cancelled
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to start SSH: {0}")]
    Spawn(#[source] ProcessError),

    #[error("SSH exited with {}", exit_code(.code))]
    Exited { code: Option<i32> },

    #[error("Failed to wait for SSH: {0}")]
    Wait(#[source] std::io::Error),
}

impl SessionError {
    /// Returns true if this error is unlikely to go away without operator action
    pub fn is_non_recoverable(&self) -> bool {
        matches!(self, SessionError::Spawn(_))
    }

    /// Returns true if retrying the session might succeed
    pub fn is_recoverable(&self) -> bool {
        !self.is_non_recoverable()
    }
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_messages() {
        assert_eq!(
            SessionError::Exited { code: Some(255) }.to_string(),
            "SSH exited with code 255"
        );
        assert_eq!(
            SessionError::Exited { code: None }.to_string(),
            "SSH exited with a signal"
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(SessionError::Exited { code: Some(1) }.is_recoverable());
        let spawn = SessionError::Spawn(ProcessError::MissingBinary("ssh".to_string()));
        assert!(spawn.is_non_recoverable());
    }
}
