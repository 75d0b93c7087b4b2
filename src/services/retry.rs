use std::future::Future;
use std::time::Duration;

use crate::core::config::PipelineSettings;
use crate::core::metrics::COLLABORATOR_RETRIES;

/// Fixed-schedule retry for collaborator calls.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    attempts: u32,
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub(crate) fn new(attempts: u32, delays: Vec<Duration>) -> Self {
        Self { attempts: attempts.max(1), delays }
    }

    pub(crate) fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.retry_attempts, settings.retry_delays())
    }

    /// No waiting between attempts.
    pub(crate) fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Vec::new())
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before attempt `attempt + 1`; repeats the last configured delay.
    pub(crate) fn delay_after(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub(crate) async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 >= self.attempts => {
                    let attempts = self.attempts;
                    let context = format!("{operation} failed after {attempts} attempts");
                    return Err(err.context(context));
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "collaborator call failed; retrying"
                    );
                    metrics::counter!(COLLABORATOR_RETRIES, "operation" => operation).increment(1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
