/// Polling utilities for waiting on conditions with timeout
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Error;

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub description: String,
}

impl PollingConfig {
    /// Create a new polling configuration
    pub fn new(timeout_secs: u64, interval_secs: u64, description: impl Into<String>) -> Self {
        Self::with_durations(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
            description,
        )
    }

    pub fn with_durations(
        timeout: Duration,
        interval: Duration,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timeout,
            interval,
            description: description.into(),
        }
    }

    /// Poll until condition is met or timeout
    ///
    /// The condition function should return:
    /// - Ok(Some(T)) when condition is met (returns T)
    /// - Ok(None) when condition is not yet met (continues polling)
    /// - Err(e) when an error occurs (stops polling and returns error)
    pub async fn poll<F, Fut, T>(&self, mut condition: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, Error>>,
    {
        info!("{}...", self.description);

        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if let Some(value) = condition().await? {
                info!("✓ {}", self.description);
                return Ok(value);
            }

            if start.elapsed() > self.timeout {
                return Err(Error::Timeout(format!(
                    "{} (gave up after {} ms, {} attempts)",
                    self.description,
                    self.timeout.as_millis(),
                    attempts
                )));
            }

            debug!("{}: not yet, attempt {}", self.description, attempts);
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Poll until condition returns Ok(true) or timeout
    pub async fn poll_until<F, Fut>(&self, mut condition: F) -> Result<(), Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, Error>>,
    {
        self.poll(|| {
            let check = condition();
            async move { Ok(check.await?.then_some(())) }
        })
        .await
    }
}
