//! Loopback port prober

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::error::ProcessError;

/// Polling parameters for [`wait_until_listening_with`]
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    /// Pause between two connection attempts
    pub interval: Duration,
    /// Timeout of a single connect attempt
    pub attempt_timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(75),
            attempt_timeout: Duration::from_millis(150),
        }
    }
}

/// Wait until `127.0.0.1:port` accepts TCP connections
pub async fn wait_until_listening(port: u16, max_wait: Duration) -> Result<(), ProcessError> {
    wait_until_listening_with(port, max_wait, ProbeOptions::default()).await
}

/// Wait until `127.0.0.1:port` accepts TCP connections, with explicit polling
///
/// Never runs longer than `max_wait` plus one in-flight attempt.
pub async fn wait_until_listening_with(
    port: u16,
    max_wait: Duration,
    options: ProbeOptions,
) -> Result<(), ProcessError> {
    let addr = format!("127.0.0.1:{}", port);
    let start = Instant::now();
    let deadline = start + max_wait;

    // At least one attempt, even with a zero wait
    loop {
        match timeout(options.attempt_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                debug!("Port {} is listening after {:?}", port, start.elapsed());
                return Ok(());
            }
            Ok(Err(e)) => debug!("Probe of {} failed: {}", addr, e),
            Err(_) => debug!("Probe of {} timed out", addr),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        sleep(options.interval.min(remaining)).await;
    }

    Err(ProcessError::NotListening {
        port,
        waited: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_listening_port_succeeds_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let start = std::time::Instant::now();
        wait_until_listening(port, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_wait_still_connects_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        wait_until_listening(port, Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_wait_on_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = wait_until_listening(port, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ProcessError::NotListening { .. }));
    }

    #[tokio::test]
    async fn test_closed_port_fails_within_bound() {
        // Bind then drop to get a port that is very likely closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let max_wait = Duration::from_millis(400);
        let start = std::time::Instant::now();
        let err = wait_until_listening(port, max_wait).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ProcessError::NotListening { port: p, .. } if p == port));
        assert!(elapsed >= max_wait);
        assert!(
            elapsed < max_wait + Duration::from_millis(500),
            "probe overran: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_port_that_comes_up_late() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let late = tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            sleep(Duration::from_secs(2)).await;
            drop(listener);
        });

        wait_until_listening(port, Duration::from_secs(2))
            .await
            .unwrap();
        late.abort();
    }
}
