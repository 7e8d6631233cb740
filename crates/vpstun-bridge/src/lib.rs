//! UDP-over-TCP bridge topology
//!
//! Builds the local relay pairs joined by named pipes, generates the shell
//! program that mirrors them on the VPS, and assembles the SSH command that
//! carries both the reverse-forwards and that program.

pub mod error;
pub mod fifo;
pub mod local;
pub mod remote;
pub mod script;
pub mod ssh;

pub use error::BridgeError;
pub use local::{LocalBridgeManager, LocalBridgeOptions};
pub use remote::{build_remote_script, RemoteScriptOptions, REMOTE_PATH};
pub use script::{quote, ShellScript};
pub use ssh::{SshCommand, SshSessionBuilder};
