//! Two-phase stop protocol tests
//!
//! These spawn real `sh` processes, so they only run on Unix.
#![cfg(unix)]

use std::time::{Duration, Instant};
use vpstun_process::{ManagedProcess, ProcessRegistry, ProcessSpec, StopOutcome};

fn spawn_sh(tag: &str, script: &str) -> ManagedProcess {
    ManagedProcess::spawn(ProcessSpec::new(tag, "sh").args(["-c", script]))
        .expect("sh should be available")
}

#[tokio::test]
async fn test_cooperative_process_is_not_force_killed() {
    let mut process = spawn_sh("cooperative", "exec sleep 30");
    let grace = Duration::from_secs(3);

    let start = Instant::now();
    let outcome = process.stop(grace).await;

    assert!(
        matches!(outcome, StopOutcome::Graceful(_)),
        "expected graceful exit, got {:?}",
        outcome
    );
    assert!(start.elapsed() < grace);
}

#[tokio::test]
async fn test_stubborn_process_is_killed_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let fifo_like = dir.path().join("pipe");
    std::fs::write(&fifo_like, "").unwrap();

    // SIG_IGN survives exec, so the sleep itself ignores SIGTERM
    let mut process = spawn_sh("stubborn", "trap '' TERM; exec sleep 30");
    process.attach_path(&fifo_like);

    // Let the shell install the trap before signalling
    tokio::time::sleep(Duration::from_millis(300)).await;

    let grace = Duration::from_millis(500);
    let start = Instant::now();
    let outcome = process.stop(grace).await;
    let elapsed = start.elapsed();

    assert_eq!(outcome, StopOutcome::Killed);
    assert!(elapsed >= grace, "killed too early: {:?}", elapsed);
    assert!(
        elapsed < grace + Duration::from_millis(500),
        "killed too late: {:?}",
        elapsed
    );
    assert!(!fifo_like.exists(), "paths must be reclaimed after the kill");
}

#[tokio::test]
async fn test_paths_survive_until_terminate_completes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipe");
    std::fs::write(&path, "").unwrap();

    let mut process = spawn_sh("holder", "trap '' TERM; exec sleep 30");
    process.attach_path(&path);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Abandon the stop half-way through the grace period
    let aborted = tokio::time::timeout(
        Duration::from_millis(100),
        process.stop(Duration::from_secs(5)),
    )
    .await;
    assert!(aborted.is_err());
    assert!(path.exists(), "path removed before the process exited");

    process.stop(Duration::from_millis(100)).await;
    assert!(!path.exists());
}

#[tokio::test]
async fn test_registry_reclaims_directory_after_all_members_exit() {
    let dir = tempfile::tempdir().unwrap();
    let pipes = dir.path().join("pipes");
    std::fs::create_dir(&pipes).unwrap();
    let pipe = pipes.join("pipe-9002");
    std::fs::write(&pipe, "").unwrap();

    let mut registry = ProcessRegistry::new();
    let mut first = spawn_sh("udp-9002-tcp", "exec sleep 30");
    first.attach_path(&pipe);
    registry.register(first);
    let mut second = spawn_sh("udp-9002-udp", "trap '' TERM; exec sleep 30");
    second.attach_path(&pipes);
    registry.register(second);

    tokio::time::sleep(Duration::from_millis(300)).await;
    registry.stop_all(Duration::from_millis(300)).await;

    assert!(registry.is_empty());
    assert!(!pipe.exists());
    assert!(!pipes.exists());
}
