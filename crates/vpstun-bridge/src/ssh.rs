//! SSH session command line
//!
//! Pure argument assembly: no I/O happens here.

use std::fmt;
use std::path::PathBuf;
use vpstun_proto::{TcpForward, TunnelConfig, UdpForward, VpsConfig};

use crate::remote::{build_remote_script, RemoteScriptOptions};
use crate::script::quote;

/// Fully assembled SSH invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub program: PathBuf,
    /// Options and reverse-forwards, without target and remote command
    pub args: Vec<String>,
    /// `user@host`
    pub target: String,
    /// Remote program text
    pub remote_script: String,
}

impl SshCommand {
    /// Complete argument vector: options, target, remote command
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push(self.target.clone());
        argv.push(self.remote_script.clone());
        argv
    }
}

impl fmt::Display for SshCommand {
    /// Shell-pasteable rendering, used for `vpstun check`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in self.argv() {
            write!(f, " {}", quote(&arg))?;
        }
        Ok(())
    }
}

/// Builder for [`SshCommand`]
#[derive(Debug, Clone)]
pub struct SshSessionBuilder {
    program: PathBuf,
    vps: VpsConfig,
    tcp_forwards: Vec<TcpForward>,
    udp_forwards: Vec<UdpForward>,
    script_options: RemoteScriptOptions,
}

impl SshSessionBuilder {
    pub fn new(vps: VpsConfig) -> Self {
        Self {
            program: PathBuf::from("ssh"),
            vps,
            tcp_forwards: Vec::new(),
            udp_forwards: Vec::new(),
            script_options: RemoteScriptOptions::default(),
        }
    }

    /// Builder preloaded with everything in `config`
    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(config.vps.clone())
            .program(&config.ssh_binary)
            .tcp_forwards(config.tcp_forwards.clone())
            .udp_forwards(config.udp_forwards.clone())
            .script_options(RemoteScriptOptions::from_config(config))
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn tcp_forwards(mut self, forwards: Vec<TcpForward>) -> Self {
        self.tcp_forwards = forwards;
        self
    }

    pub fn udp_forwards(mut self, forwards: Vec<UdpForward>) -> Self {
        self.udp_forwards = forwards;
        self
    }

    pub fn script_options(mut self, options: RemoteScriptOptions) -> Self {
        self.script_options = options;
        self
    }

    /// SSH options and reverse-forwards
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.vps.ssh_key.to_string_lossy().into_owned(),
            "-p".to_string(),
            self.vps.port.to_string(),
        ];

        let options = [
            "BatchMode=yes".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            format!("ServerAliveInterval={}", self.vps.keepalive_interval_seconds),
            format!("ServerAliveCountMax={}", self.vps.keepalive_count_max),
            format!("StrictHostKeyChecking={}", self.vps.strict_host_key),
        ];
        for option in options {
            args.push("-o".to_string());
            args.push(option);
        }
        args.push("-T".to_string());

        for forward in &self.tcp_forwards {
            args.push("-R".to_string());
            args.push(forward.reverse_spec());
        }
        for forward in &self.udp_forwards {
            args.push("-R".to_string());
            args.push(forward.reverse_spec());
        }

        args
    }

    pub fn build(&self) -> SshCommand {
        SshCommand {
            program: self.program.clone(),
            args: self.args(),
            target: self.vps.target(),
            remote_script: build_remote_script(&self.udp_forwards, &self.script_options),
        }
    }
}
