//! Shutdown signal handling

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Registered SIGINT/SIGTERM handlers
///
/// Handlers are installed by [`ShutdownSignals::install`] itself, so a signal
/// delivered before the first `recv` is still caught instead of killing the
/// process with the default action.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignals {
    /// Must be called from within a tokio runtime
    #[cfg(unix)]
    pub fn install() -> Self {
        use tokio::signal::unix::SignalKind;

        Self {
            interrupt: register(SignalKind::interrupt(), "SIGINT"),
            terminate: register(SignalKind::terminate(), "SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    pub fn install() -> Self {
        Self {}
    }

    /// Resolve on the next SIGINT or SIGTERM
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = recv_or_pending(&mut self.interrupt) => info!("Received SIGINT, shutting down"),
            _ = recv_or_pending(&mut self.terminate) => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(unix)]
fn register(
    kind: tokio::signal::unix::SignalKind,
    name: &str,
) -> Option<tokio::signal::unix::Signal> {
    match tokio::signal::unix::signal(kind) {
        Ok(signal) => Some(signal),
        Err(e) => {
            warn!("Failed to register {} handler: {}", name, e);
            None
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    ShutdownSignals::install().recv().await;
}

/// Cancel `token` once a shutdown signal arrives
///
/// The handlers are registered before this returns.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    let mut signals = ShutdownSignals::install();
    tokio::spawn(async move {
        signals.recv().await;
        token.cancel();
    })
}
