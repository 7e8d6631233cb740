//! Supervisor / reconnect loop
//!
//! ```text
//! Initializing -> BridgesUp -> SessionRunning <-> ReconnectWait
//!        \             \              \               /
//!         +-------------+--------------+-> ShuttingDown
//! ```
//!
//! Bridges are built and probed once. Sessions are relaunched over the same
//! bridges until the cancellation token fires; startup failures end the run.

use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vpstun_bridge::{LocalBridgeManager, LocalBridgeOptions, SshSessionBuilder};
use vpstun_process::{require_binary, wait_until_listening, ProcessRegistry};
use vpstun_proto::TunnelConfig;

use crate::error::SupervisorError;
use crate::reconnect::ReconnectManager;
use crate::session::{SessionExit, SessionLauncher};

/// Observable supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initializing,
    BridgesUp,
    SessionRunning { attempt: usize },
    ReconnectWait { attempt: usize },
    ShuttingDown,
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Number of SSH sessions started
    pub session_launches: usize,
}

/// Owns the local bridges and the session loop
pub struct Supervisor<L> {
    config: TunnelConfig,
    launcher: L,
    state_tx: watch::Sender<SupervisorState>,
}

impl<L: SessionLauncher> Supervisor<L> {
    pub fn new(config: TunnelConfig, launcher: L) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Initializing);
        Self {
            config,
            launcher,
            state_tx,
        }
    }

    pub fn state_receiver(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Run until `cancel` fires or startup fails
    ///
    /// Every process started along the way is stopped before this returns,
    /// on success and on error alike.
    pub async fn run(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<SupervisorReport, SupervisorError> {
        let mut registry = ProcessRegistry::new();
        let mut report = SupervisorReport::default();

        let result = self.supervise(&mut registry, &mut report, &cancel).await;

        self.set_state(SupervisorState::ShuttingDown);
        registry.stop_all(self.config.stop_grace()).await;

        match &result {
            Ok(()) => info!(
                "Shutdown complete after {} session(s)",
                report.session_launches
            ),
            Err(e) => error!("Supervisor stopped: {}", e),
        }

        result.map(|()| report)
    }

    async fn supervise(
        &mut self,
        registry: &mut ProcessRegistry,
        report: &mut SupervisorReport,
        cancel: &CancellationToken,
    ) -> Result<(), SupervisorError> {
        self.set_state(SupervisorState::Initializing);

        let ssh_binary = require_binary(&self.config.ssh_binary)?;
        let relay_binary = self.required_relay()?;

        if let Some(relay_binary) = relay_binary {
            let mut options = LocalBridgeOptions::from_config(&self.config);
            options.relay_binary = relay_binary;
            LocalBridgeManager::new(options)
                .start(&self.config.udp_forwards, registry)
                .await?;
        }
        self.set_state(SupervisorState::BridgesUp);

        if !self.probe_bridges(cancel).await? {
            return Ok(());
        }

        let command = SshSessionBuilder::from_config(&self.config)
            .program(ssh_binary)
            .build();
        let mut reconnect = ReconnectManager::new(self.config.reconnect_delay());

        info!(
            "Tunnel to {}: {} TCP forward(s), {} UDP forward(s)",
            command.target,
            self.config.tcp_forwards.len(),
            self.config.udp_forwards.len()
        );

        while !cancel.is_cancelled() {
            let dead = registry.dead_tags();
            if !dead.is_empty() {
                warn!("Local relay(s) no longer running: {}", dead.join(", "));
            }

            report.session_launches += 1;
            self.set_state(SupervisorState::SessionRunning {
                attempt: report.session_launches,
            });

            match self.launcher.run_session(&command, cancel).await {
                Ok(SessionExit::Cancelled) => break,
                Ok(SessionExit::Ended) => info!("SSH session ended"),
                Err(e) if e.is_recoverable() => warn!("SSH session failed: {}", e),
                Err(e) => error!("SSH session failed: {}", e),
            }

            if cancel.is_cancelled() {
                break;
            }

            self.set_state(SupervisorState::ReconnectWait {
                attempt: reconnect.attempt() + 1,
            });
            info!("Reconnecting in {:?}", reconnect.delay());
            if reconnect.wait(cancel).await.is_err() {
                break;
            }
        }

        Ok(())
    }

    /// The relay is only needed when there is something to bridge
    fn required_relay(&self) -> Result<Option<PathBuf>, SupervisorError> {
        if self.config.udp_forwards.is_empty() {
            return Ok(None);
        }
        Ok(Some(require_binary(&self.config.relay_binary)?))
    }

    /// Probe every wrap port; `Ok(false)` means cancelled mid-probe
    async fn probe_bridges(&self, cancel: &CancellationToken) -> Result<bool, SupervisorError> {
        let max_wait = self.config.health_check_timeout();

        for forward in &self.config.udp_forwards {
            let probe = tokio::select! {
                result = wait_until_listening(forward.wrap_tcp_port, max_wait) => Some(result),
                _ = cancel.cancelled() => None,
            };

            match probe {
                Some(Ok(())) => info!(
                    port = forward.wrap_tcp_port,
                    "Bridge {} is listening",
                    forward.tag()
                ),
                Some(Err(e)) => return Err(SupervisorError::BridgeHealth(e)),
                None => return Ok(false),
            }
        }

        Ok(true)
    }

    fn set_state(&self, state: SupervisorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Supervisor state: {:?} -> {:?}", previous, state);
        }
    }
}
