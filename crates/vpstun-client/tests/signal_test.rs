//! Signal delivery tests
//!
//! Kept in their own binary: a SIGTERM that is not handled would take the
//! whole test process down.
#![cfg(unix)]

use std::time::Duration;
use vpstun_client::{spawn_signal_listener, CancellationToken};

#[tokio::test]
async fn test_sigterm_before_listener_task_runs_cancels_token() {
    let token = CancellationToken::new();
    let listener = spawn_signal_listener(token.clone());

    // No yield between spawning and signalling: the spawned task has not
    // been polled yet, so only an eagerly installed handler can catch this.
    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .expect("SIGTERM should cancel the token");
    listener.await.unwrap();
}
