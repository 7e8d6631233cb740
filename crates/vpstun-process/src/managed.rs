//! Managed external processes
//!
//! A [`ManagedProcess`] owns one spawned child plus the filesystem paths that
//! must disappear once that child is gone. Stopping follows a two-phase
//! protocol: SIGTERM, then SIGKILL once the grace period has elapsed. Paths
//! are only reclaimed after the child has been reaped.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::ProcessError;

/// Everything needed to start a managed process
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub tag: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Append stdout and stderr to this file; `None` inherits the parent's streams
    pub log_file: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(tag: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            tag: tag.into(),
            program: program.into(),
            args: Vec::new(),
            log_file: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing to do, the process was stopped earlier
    AlreadyStopped,
    /// The process had exited on its own before the stop request
    Exited(ExitStatus),
    /// The process exited within the grace period
    Graceful(ExitStatus),
    /// The process ignored the graceful signal and was killed
    Killed,
}

/// A spawned child owned by exactly one component
#[derive(Debug)]
pub struct ManagedProcess {
    tag: String,
    pid: Option<u32>,
    child: Option<Child>,
    paths: Vec<PathBuf>,
}

impl ManagedProcess {
    /// Spawn the process described by `spec`
    pub fn spawn(spec: ProcessSpec) -> Result<Self, ProcessError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(path) = &spec.log_file {
            let log = open_append(path).map_err(|source| ProcessError::LogFile {
                path: path.clone(),
                source,
            })?;
            let log_err = log.try_clone().map_err(|source| ProcessError::LogFile {
                path: path.clone(),
                source,
            })?;
            command.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
        }

        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            tag: spec.tag.clone(),
            source,
        })?;
        let pid = child.id();

        debug!(tag = %spec.tag, ?pid, "Spawned {:?}", spec.program);

        Ok(Self {
            tag: spec.tag,
            pid,
            child: Some(child),
            paths: Vec::new(),
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// OS process id captured at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Register a path to delete once this process has exited
    pub fn attach_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// True once the child has exited or has been stopped
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => true,
        }
    }

    /// Wait for the child to exit on its own
    ///
    /// Cancel-safe: dropping the future leaves the child in place.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        match self.child.as_mut() {
            Some(child) => child.wait().await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} has already been stopped", self.tag),
            )),
        }
    }

    /// Graceful signal, then a forced kill after `grace`
    ///
    /// Does not touch the attached paths; see [`ManagedProcess::stop`].
    pub async fn terminate(&mut self, grace: Duration) -> StopOutcome {
        let Some(child) = self.child.as_mut() else {
            return StopOutcome::AlreadyStopped;
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!(tag = %self.tag, "Already exited with {}", status);
            self.child = None;
            return StopOutcome::Exited(status);
        }

        send_graceful_signal(child, &self.tag);

        let outcome = match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(tag = %self.tag, "Exited gracefully with {}", status);
                StopOutcome::Graceful(status)
            }
            Ok(Err(e)) => {
                warn!(tag = %self.tag, "Failed to wait for process: {}", e);
                force_kill(child, &self.tag).await
            }
            Err(_) => {
                warn!(
                    tag = %self.tag,
                    "Process ignored graceful stop for {:?}, killing",
                    grace
                );
                force_kill(child, &self.tag).await
            }
        };

        self.child = None;
        outcome
    }

    /// Stop the process and reclaim its paths
    ///
    /// Calling it again after the process is gone is a no-op.
    pub async fn stop(&mut self, grace: Duration) -> StopOutcome {
        let outcome = self.terminate(grace).await;
        if outcome != StopOutcome::AlreadyStopped {
            info!(tag = %self.tag, pid = ?self.pid, "Stopped ({:?})", outcome);
        }
        self.reclaim_paths();
        outcome
    }

    /// Delete the attached paths, best effort
    ///
    /// Only acts once the child is gone; failures are logged, never returned.
    pub fn reclaim_paths(&mut self) {
        if self.child.is_some() {
            debug!(tag = %self.tag, "Process still owned, keeping paths");
            return;
        }
        for path in self.paths.drain(..) {
            remove_path(&path);
        }
    }
}

#[cfg(unix)]
fn send_graceful_signal(child: &mut Child, tag: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(tag = %tag, "SIGTERM to {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(child: &mut Child, tag: &str) {
    if let Err(e) = child.start_kill() {
        debug!(tag = %tag, "Failed to signal process: {}", e);
    }
}

async fn force_kill(child: &mut Child, tag: &str) -> StopOutcome {
    if let Err(e) = child.kill().await {
        warn!(tag = %tag, "Failed to kill process: {}", e);
    }
    StopOutcome::Killed
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

fn remove_path(path: &Path) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{:?} already gone", path)
        }
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(tag: &str, script: &str) -> ManagedProcess {
        ManagedProcess::spawn(ProcessSpec::new(tag, "sh").args(["-c", script])).unwrap()
    }

    #[tokio::test]
    async fn test_stop_twice_is_noop() {
        let mut process = sh("sleeper", "exec sleep 30");
        assert!(process.pid().is_some());

        let first = process.stop(Duration::from_secs(2)).await;
        assert!(matches!(first, StopOutcome::Graceful(_)));

        let second = process.stop(Duration::from_secs(2)).await;
        assert_eq!(second, StopOutcome::AlreadyStopped);
        assert!(process.has_exited());
    }

    #[tokio::test]
    async fn test_already_exited_process() {
        let mut process = sh("quick", "exit 3");
        let status = process.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));

        let outcome = process.stop(Duration::from_millis(100)).await;
        assert!(matches!(outcome, StopOutcome::Exited(s) if s.code() == Some(3)));
    }

    #[tokio::test]
    async fn test_log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("relay.log");
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(&log, "previous run\n").unwrap();

        let mut process = ManagedProcess::spawn(
            ProcessSpec::new("echo", "sh")
                .args(["-c", "echo hello; echo oops >&2"])
                .log_file(&log),
        )
        .unwrap();
        process.wait().await.unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.starts_with("previous run\n"));
        assert!(content.contains("hello"));
        assert!(content.contains("oops"));
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_tag() {
        let err = ManagedProcess::spawn(ProcessSpec::new("ghost", "/nonexistent/relay")).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { ref tag, .. } if tag == "ghost"));
    }

    #[tokio::test]
    async fn test_paths_kept_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pipe");
        std::fs::write(&file, "").unwrap();

        let mut process = sh("holder", "exec sleep 30");
        process.attach_path(&file);
        process.reclaim_paths();
        assert!(file.exists());

        process.stop(Duration::from_secs(2)).await;
        assert!(!file.exists());
        assert!(process.paths().is_empty());
    }
}
