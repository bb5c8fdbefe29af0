//! Bounded wait for a run to reach a terminal status.

use super::{AssistantClient, AssistantError};
use async_trait::async_trait;
use std::time::Duration;

/// Fixed-interval poll budget. The default waits up to about five minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Sleep between polls, injectable so tests do not wait in real time.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll until the run is terminal and return the number of polls made.
///
/// Fails with `RunFailed` on any terminal status other than `completed`
/// and with `Timeout` once `policy.max_attempts` polls saw no terminal
/// status. No sleep follows the last attempt.
pub async fn await_completion<C, D>(
    client: &C,
    delay: &D,
    policy: PollPolicy,
    thread_id: &str,
    run_id: &str,
) -> Result<u32, AssistantError>
where
    C: AssistantClient + ?Sized,
    D: Delay + ?Sized,
{
    for attempt in 1..=policy.max_attempts {
        let status = client.poll_run(thread_id, run_id).await?;
        tracing::debug!(thread_id, run_id, attempt, status = %status, "Polled run");

        if status.is_terminal() {
            if status.is_success() {
                return Ok(attempt);
            }
            tracing::warn!(thread_id, run_id, status = %status, "Run ended without completing");
            return Err(AssistantError::RunFailed(status));
        }

        if attempt < policy.max_attempts {
            delay.sleep(policy.interval).await;
        }
    }

    tracing::warn!(
        thread_id,
        run_id,
        attempts = policy.max_attempts,
        "Run did not finish within the poll budget"
    );
    Err(AssistantError::Timeout {
        attempts: policy.max_attempts,
    })
}
