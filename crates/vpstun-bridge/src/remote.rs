//! Remote bootstrap script
//!
//! The SSH session runs a generated POSIX shell program on the VPS. For every
//! UDP forward it creates a FIFO in a private temporary directory and starts
//! two relays:
//!
//! ```text
//! public UDP :9002  <->  FIFO  <->  TCP 127.0.0.1:10000 (reverse-forward to us)
//! ```
//!
//! A watchdog then polls the relay pids and exits non-zero as soon as one of
//! them dies. Exiting ends the SSH session, and the local supervisor rebuilds
//! everything from scratch on reconnect.

use std::path::{Path, PathBuf};
use vpstun_proto::{TunnelConfig, UdpForward, LOOPBACK};

use crate::script::{quote, ShellScript};

/// Fixed `PATH` so the script does not depend on the remote login shell
pub const REMOTE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Knobs of the generated script
#[derive(Debug, Clone)]
pub struct RemoteScriptOptions {
    /// Relay executable looked up on the VPS
    pub relay_binary: String,
    /// Directory for the remote relay logs
    pub log_dir: PathBuf,
    /// `-T` inactivity timeout, applied per forked child of the public listener
    pub idle_timeout_seconds: u64,
    /// Seconds between two watchdog sweeps
    pub watchdog_interval_seconds: u64,
}

impl Default for RemoteScriptOptions {
    fn default() -> Self {
        Self {
            relay_binary: "socat".to_string(),
            log_dir: PathBuf::from("/var/log"),
            idle_timeout_seconds: 30,
            watchdog_interval_seconds: 5,
        }
    }
}

impl RemoteScriptOptions {
    pub fn from_config(config: &TunnelConfig) -> Self {
        Self {
            relay_binary: config.relay_binary.clone(),
            log_dir: config.remote_log_dir.clone(),
            idle_timeout_seconds: config.relay_idle_timeout_seconds,
            ..Self::default()
        }
    }

    fn log_file(&self, kind: &str, forward: &UdpForward) -> String {
        let path = self
            .log_dir
            .join(format!("vpstun-remote-{}-{}.log", kind, forward.public_port));
        quote(&path_str(&path))
    }
}

/// Generate the remote program for `forwards`
pub fn build_remote_script(forwards: &[UdpForward], options: &RemoteScriptOptions) -> String {
    let mut script = ShellScript::new();

    script
        .line("set -eu")
        .line(format!("export PATH={}", REMOTE_PATH))
        .line(format!(
            "RELAY_BIN=\"$(command -v {} || true)\"",
            quote(&options.relay_binary)
        ))
        .open("if [ -z \"$RELAY_BIN\" ]; then")
        .line(format!(
            "echo \"ERROR: {} not found on VPS. PATH=$PATH\" >&2",
            options.relay_binary.replace(['"', '$', '`', '\\'], "")
        ))
        .line("exit 1")
        .close("fi");

    // One cleanup handler for every exit path; the EXIT trap is cleared
    // first so it cannot run twice.
    script
        .line("relays=\"\"")
        .line("workdir=\"\"")
        .open("cleanup() {")
        .line("trap - EXIT HUP INT TERM")
        .open("for entry in $relays; do")
        .line("kill \"${entry%%:*}\" 2>/dev/null || true")
        .close("done")
        .open("if [ -n \"$workdir\" ]; then")
        .line("rm -rf \"$workdir\"")
        .close("fi")
        .close("}")
        .line("trap cleanup EXIT")
        .line("trap 'exit 129' HUP")
        .line("trap 'exit 130' INT")
        .line("trap 'exit 143' TERM");

    if forwards.is_empty() {
        // Nothing to relay; hold the session open for the TCP reverse-forwards
        script
            .open("while true; do")
            .line("sleep 3600")
            .close("done");
        return script.render();
    }

    let log_dir = quote(&path_str(&options.log_dir));
    script
        .line("workdir=\"$(mktemp -d /tmp/vpstun.XXXXXX)\"")
        .line(format!("mkdir -p {} 2>/dev/null || true", log_dir));

    for forward in forwards {
        push_forward(&mut script, forward, options);
    }

    script
        .line("echo \"vpstun: relays running:$relays\" >&2")
        .open("while true; do")
        .open("for entry in $relays; do")
        .open("if ! kill -0 \"${entry%%:*}\" 2>/dev/null; then")
        .line("echo \"vpstun: relay ${entry#*:} (pid ${entry%%:*}) died; exiting to force reconnect\" >&2")
        .line("exit 1")
        .close("fi")
        .close("done")
        .line(format!("sleep {}", options.watchdog_interval_seconds))
        .close("done");

    script.render()
}

fn push_forward(script: &mut ShellScript, forward: &UdpForward, options: &RemoteScriptOptions) {
    let port = forward.public_port;
    let pipe = format!("\"$workdir/pipe-{}\"", port);
    let pipe_addr = format!("\"PIPE:$workdir/pipe-{}\"", port);
    let timeout = options.idle_timeout_seconds.to_string();
    let tag = forward.tag();

    script
        .line(format!(
            "# udp {} via wrap tcp {}",
            port, forward.wrap_tcp_port
        ))
        .line(format!(
            "if command -v fuser >/dev/null 2>&1; then fuser -k {}/udp >/dev/null 2>&1 || true; fi",
            port
        ))
        .line(format!("mkfifo -m 600 {}", pipe));

    let public_listen = format!("UDP-LISTEN:{},bind=0.0.0.0,reuseaddr,fork", port);
    script
        .command([
            "\"$RELAY_BIN\"",
            "-T",
            &timeout,
            &quote(&public_listen),
            &pipe_addr,
            &format!(">>{}", options.log_file("udp", forward)),
            "2>&1",
            "&",
        ])
        .line(format!("relays=\"$relays $!:{}-public\"", tag));

    // No idle timeout here: the connector holds the pipe for the whole
    // session and the watchdog treats its exit as fatal.
    let wrap_connect = format!("TCP:{}:{}", LOOPBACK, forward.wrap_tcp_port);
    script
        .command([
            "\"$RELAY_BIN\"",
            &pipe_addr,
            &quote(&wrap_connect),
            &format!(">>{}", options.log_file("tcp", forward)),
            "2>&1",
            "&",
        ])
        .line(format!("relays=\"$relays $!:{}-wrap\"", tag));
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward(public_port: u16, wrap_tcp_port: u16) -> UdpForward {
        UdpForward {
            public_port,
            local_host: "127.0.0.1".to_string(),
            local_udp_port: public_port - 1000,
            wrap_tcp_port,
        }
    }

    #[test]
    fn test_preamble() {
        let script = build_remote_script(&[], &RemoteScriptOptions::default());
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "set -eu");
        assert_eq!(lines[1], format!("export PATH={}", REMOTE_PATH));
        assert!(script.contains("RELAY_BIN=\"$(command -v socat || true)\""));
        assert!(script.contains("echo \"ERROR: socat not found on VPS. PATH=$PATH\" >&2"));
        assert!(script.contains("trap cleanup EXIT"));
        assert!(script.contains("trap 'exit 143' TERM"));
        assert!(script.contains("trap 'exit 130' INT"));
    }

    #[test]
    fn test_zero_forwards_keeps_session_open() {
        let script = build_remote_script(&[], &RemoteScriptOptions::default());
        assert!(script.ends_with("while true; do\n  sleep 3600\ndone\n"));
        assert!(!script.contains("mkfifo"));
        assert!(!script.contains("mktemp"));
        assert!(!script.contains("kill -0"));
    }

    #[test]
    fn test_single_forward_topology() {
        let script = build_remote_script(&[forward(9002, 10000)], &RemoteScriptOptions::default());

        assert!(script.contains("workdir=\"$(mktemp -d /tmp/vpstun.XXXXXX)\""));
        assert!(script.contains("fuser -k 9002/udp"));
        assert!(script.contains("mkfifo -m 600 \"$workdir/pipe-9002\""));
        assert!(script.contains(
            "\"$RELAY_BIN\" -T 30 UDP-LISTEN:9002,bind=0.0.0.0,reuseaddr,fork \"PIPE:$workdir/pipe-9002\" >>/var/log/vpstun-remote-udp-9002.log 2>&1 &"
        ));
        assert!(script.contains(
            "\"$RELAY_BIN\" \"PIPE:$workdir/pipe-9002\" TCP:127.0.0.1:10000 >>/var/log/vpstun-remote-tcp-9002.log 2>&1 &"
        ));
        assert!(script.contains("relays=\"$relays $!:udp-9002-public\""));
        assert!(script.contains("relays=\"$relays $!:udp-9002-wrap\""));
        assert!(script.contains("if ! kill -0 \"${entry%%:*}\" 2>/dev/null; then"));
        assert!(script.contains("sleep 5"));
    }

    #[test]
    fn test_idle_timeout_only_on_public_listener() {
        let script = build_remote_script(&[forward(9002, 10000)], &RemoteScriptOptions::default());
        let relays: Vec<&str> = script
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("\"$RELAY_BIN\""))
            .collect();

        assert_eq!(relays.len(), 2);
        assert!(relays[0].contains("UDP-LISTEN:9002"));
        assert!(relays[0].contains(" -T 30 "));
        assert!(relays[1].contains("TCP:127.0.0.1:10000"));
        assert!(!relays[1].contains("-T"));
    }

    #[test]
    fn test_every_forward_gets_its_own_pipe() {
        let script = build_remote_script(
            &[forward(9002, 10000), forward(9003, 10001)],
            &RemoteScriptOptions::default(),
        );
        assert_eq!(script.matches("mkfifo -m 600").count(), 2);
        assert_eq!(script.matches("$!:").count(), 4);
        assert!(script.contains("TCP:127.0.0.1:10001"));
        // Single watchdog loop regardless of forward count
        assert_eq!(script.matches("kill -0").count(), 1);
    }

    #[test]
    fn test_cleanup_removes_workdir_once() {
        let script = build_remote_script(&[forward(9002, 10000)], &RemoteScriptOptions::default());
        assert_eq!(script.matches("rm -rf \"$workdir\"").count(), 1);
        assert!(script.contains("trap - EXIT HUP INT TERM"));
    }

    #[test]
    fn test_log_dir_with_spaces_is_quoted() {
        let options = RemoteScriptOptions {
            log_dir: PathBuf::from("/srv/my logs"),
            ..RemoteScriptOptions::default()
        };
        let script = build_remote_script(&[forward(9002, 10000)], &options);
        assert!(script.contains(">>'/srv/my logs/vpstun-remote-udp-9002.log'"));
        assert!(script.contains("mkdir -p '/srv/my logs' 2>/dev/null || true"));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_is_valid_shell() {
        let script = build_remote_script(
            &[forward(9002, 10000), forward(9003, 10001)],
            &RemoteScriptOptions::default(),
        );
        let status = std::process::Command::new("sh")
            .args(["-n", "-c", &script])
            .status()
            .unwrap();
        assert!(status.success());
    }
}
