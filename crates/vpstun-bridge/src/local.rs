//! Local side of the UDP-over-TCP bridges
//!
//! Each UDP forward becomes two relay processes spliced through a FIFO:
//!
//! ```text
//! TCP 127.0.0.1:wrap (ssh -R target)  <->  FIFO  <->  UDP local_host:local_udp_port
//! ```
//!
//! Relays are registered in the caller's [`ProcessRegistry`], which owns
//! their lifetime from then on. The FIFO is attached to the TCP relay of its
//! pair and the pipe directory to the very last relay started, so the
//! registry deletes every path exactly once and the directory last.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use vpstun_process::{ManagedProcess, ProcessRegistry, ProcessSpec};
use vpstun_proto::{TunnelConfig, UdpForward, LOOPBACK};

use crate::error::BridgeError;
use crate::fifo::create_fifo;

/// Settings shared by every local relay
#[derive(Debug, Clone)]
pub struct LocalBridgeOptions {
    /// Relay executable, ideally already resolved to an absolute path
    pub relay_binary: PathBuf,
    /// Directory for the local relay logs
    pub log_dir: PathBuf,
    /// `-T` inactivity timeout, applied per forked child of the wrap listener
    pub idle_timeout_seconds: u64,
    /// Grace period used when unwinding a failed start
    pub grace: Duration,
}

impl LocalBridgeOptions {
    pub fn from_config(config: &TunnelConfig) -> Self {
        Self {
            relay_binary: PathBuf::from(&config.relay_binary),
            log_dir: config.log_dir.clone(),
            idle_timeout_seconds: config.relay_idle_timeout_seconds,
            grace: config.stop_grace(),
        }
    }
}

/// Builds the local relay pairs
#[derive(Debug)]
pub struct LocalBridgeManager {
    options: LocalBridgeOptions,
    pipe_dir: Option<PathBuf>,
}

impl LocalBridgeManager {
    pub fn new(options: LocalBridgeOptions) -> Self {
        Self {
            options,
            pipe_dir: None,
        }
    }

    /// Directory holding the FIFOs of the last successful start
    pub fn pipe_dir(&self) -> Option<&Path> {
        self.pipe_dir.as_deref()
    }

    /// Start one relay pair per forward and return the number of relays
    ///
    /// On failure every relay started by this call is stopped and the pipe
    /// directory removed before the error is returned.
    pub async fn start(
        &mut self,
        forwards: &[UdpForward],
        registry: &mut ProcessRegistry,
    ) -> Result<usize, BridgeError> {
        if forwards.is_empty() {
            info!("No UDP forwards configured, skipping local bridges");
            return Ok(0);
        }

        let pipe_dir = tempfile::Builder::new()
            .prefix("vpstun-")
            .tempdir()
            .map_err(BridgeError::PipeDir)?
            .keep();
        debug!("Created pipe directory {:?}", pipe_dir);

        let start_index = registry.len();
        for forward in forwards {
            if let Err(e) = self.start_pair(forward, &pipe_dir, registry) {
                warn!("Bridge setup failed, unwinding: {}", e);
                registry.stop_from(start_index, self.options.grace).await;
                remove_pipe_dir(&pipe_dir);
                return Err(e);
            }
        }

        if let Some(last) = registry.last_mut() {
            last.attach_path(&pipe_dir);
        }
        self.pipe_dir = Some(pipe_dir);

        let started = registry.len() - start_index;
        info!(
            "Started {} local relay(s) for {} UDP forward(s)",
            started,
            forwards.len()
        );
        Ok(started)
    }

    fn start_pair(
        &self,
        forward: &UdpForward,
        pipe_dir: &Path,
        registry: &mut ProcessRegistry,
    ) -> Result<(), BridgeError> {
        let port = forward.public_port;
        let fifo = pipe_dir.join(format!("pipe-{}", port));
        create_fifo(&fifo)?;

        let pipe_addr = format!("PIPE:{}", fifo.to_string_lossy());
        let listen = format!(
            "TCP-LISTEN:{},bind={},reuseaddr,fork",
            forward.wrap_tcp_port, LOOPBACK
        );
        let udp = format!("UDP:{}", forward.local_udp_target());

        // Only the forking listener gets an idle timeout; the UDP side holds
        // both ends open for the whole run and must never time out.
        let tcp_args = vec![
            "-T".to_string(),
            self.options.idle_timeout_seconds.to_string(),
            listen,
            pipe_addr.clone(),
        ];
        let mut tcp_relay = self.spawn_relay(forward, "tcp", tcp_args)?;
        tcp_relay.attach_path(&fifo);
        info!(
            tag = %tcp_relay.tag(),
            pid = ?tcp_relay.pid(),
            "Listening on {}:{}",
            LOOPBACK,
            forward.wrap_tcp_port
        );
        registry.register(tcp_relay);

        let udp_relay = self.spawn_relay(forward, "udp", vec![pipe_addr, udp])?;
        info!(
            tag = %udp_relay.tag(),
            pid = ?udp_relay.pid(),
            "Relaying to UDP {}",
            forward.local_udp_target()
        );
        registry.register(udp_relay);

        Ok(())
    }

    fn spawn_relay(
        &self,
        forward: &UdpForward,
        kind: &str,
        args: Vec<String>,
    ) -> Result<ManagedProcess, BridgeError> {
        let port = forward.public_port;
        let log_file = self
            .options
            .log_dir
            .join(format!("vpstun-local-{}-{}.log", kind, port));

        let tag = format!("{}-{}", forward.tag(), kind);
        let spec = ProcessSpec::new(tag, &self.options.relay_binary)
            .args(args)
            .log_file(log_file);

        ManagedProcess::spawn(spec).map_err(|source| BridgeError::Relay { port, source })
    }
}

fn remove_pipe_dir(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}
