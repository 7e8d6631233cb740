//! Registry of processes owned by the supervisor

use futures::future::join_all;
use std::time::Duration;
use tracing::{info, warn};

use crate::managed::ManagedProcess;

/// Ordered set of running processes
///
/// Owned by the supervisor and lent to every component that spawns, so all
/// children are torn down from a single place.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: Vec<ManagedProcess>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, process: ManagedProcess) {
        self.processes.push(process);
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn tags(&self) -> Vec<String> {
        self.processes.iter().map(|p| p.tag().to_string()).collect()
    }

    /// Most recently registered process
    pub fn last_mut(&mut self) -> Option<&mut ManagedProcess> {
        self.processes.last_mut()
    }

    /// Tags of processes that have exited on their own
    pub fn dead_tags(&mut self) -> Vec<String> {
        self.processes
            .iter_mut()
            .filter_map(|p| p.has_exited().then(|| p.tag().to_string()))
            .collect()
    }

    /// Stop every registered process
    pub async fn stop_all(&mut self, grace: Duration) {
        self.stop_from(0, grace).await;
    }

    /// Stop and unregister the processes registered at `index` and later
    ///
    /// All of them are signalled concurrently; paths are reclaimed in
    /// registration order only once every one of them has exited.
    pub async fn stop_from(&mut self, index: usize, grace: Duration) {
        if index >= self.processes.len() {
            return;
        }

        let mut stopping = self.processes.split_off(index);
        info!("Stopping {} process(es)", stopping.len());

        let outcomes = join_all(stopping.iter_mut().map(|p| p.terminate(grace))).await;
        for (process, outcome) in stopping.iter().zip(outcomes) {
            info!(tag = %process.tag(), pid = ?process.pid(), "Stopped ({:?})", outcome);
        }

        for process in stopping.iter_mut() {
            process.reclaim_paths();
            if !process.paths().is_empty() {
                warn!(tag = %process.tag(), "Paths left behind: {:?}", process.paths());
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::managed::ProcessSpec;

    fn sleeper(tag: &str) -> ManagedProcess {
        ManagedProcess::spawn(ProcessSpec::new(tag, "sh").args(["-c", "exec sleep 30"])).unwrap()
    }

    #[tokio::test]
    async fn test_stop_from_keeps_earlier_processes() {
        let mut registry = ProcessRegistry::new();
        registry.register(sleeper("a"));
        registry.register(sleeper("b"));
        registry.register(sleeper("c"));

        registry.stop_from(1, Duration::from_secs(2)).await;
        assert_eq!(registry.tags(), vec!["a".to_string()]);

        registry.stop_all(Duration::from_secs(2)).await;
        assert!(registry.is_empty());

        // Stopping an empty registry is harmless
        registry.stop_all(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_dead_tags() {
        let mut registry = ProcessRegistry::new();
        registry.register(sleeper("alive"));
        registry.register(
            ManagedProcess::spawn(ProcessSpec::new("dead", "sh").args(["-c", "exit 1"])).unwrap(),
        );

        let mut dead = Vec::new();
        for _ in 0..50 {
            dead = registry.dead_tags();
            if !dead.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(dead, vec!["dead".to_string()]);

        registry.stop_all(Duration::from_secs(2)).await;
    }
}
