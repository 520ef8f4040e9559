//! Test helper functions and utilities

use anyhow::Result;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing_subscriber::EnvFilter;

/// Initialize test logging with environment-based configuration.
///
/// Safe to call multiple times - subsequent calls are ignored.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wait for a condition to become true with timeout and polling.
///
/// # Examples
///
/// ```ignore
/// wait_for(
///     || async { server.control_messages().len() == 1 },
///     Duration::from_secs(5),
///     Duration::from_millis(10),
/// ).await?;
/// ```
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(timeout_duration, async {
        loop {
            if condition().await {
                return;
            }
            sleep(poll_interval).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("Timeout waiting for condition"))
}

/// Synchronous-condition variant of [`wait_for`] with test defaults
/// (5 s timeout, 10 ms polling).
pub async fn wait_until<F>(condition: F) -> Result<()>
where
    F: Fn() -> bool,
{
    wait_for(
        || std::future::ready(condition()),
        Duration::from_secs(5),
        Duration::from_millis(10),
    )
    .await
}

/// Wrap a future with a timeout so a broken test fails instead of hanging.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl std::future::Future<Output = T>,
) -> Result<T> {
    timeout(duration, future)
        .await
        .map_err(|_| anyhow::anyhow!("Test timeout after {:?}", duration))
}
