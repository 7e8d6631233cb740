//! Tunnel supervision
//!
//! Starts the local bridges, health-checks them, then keeps one SSH session
//! alive until cancelled, reconnecting after every exit.

pub mod error;
pub mod reconnect;
pub mod session;
pub mod signal;
pub mod supervisor;

pub use error::{SessionError, SupervisorError};
pub use reconnect::{ReconnectError, ReconnectManager};
pub use session::{SessionExit, SessionLauncher, SshLauncher};
pub use signal::{shutdown_signal, spawn_signal_listener, ShutdownSignals};
pub use supervisor::{Supervisor, SupervisorReport, SupervisorState};

pub use tokio_util::sync::CancellationToken;
