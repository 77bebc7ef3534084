use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

use crate::RelayError;

/// Status of an assistant run as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    RequiresAction,
    Failed(Option<String>),
    Cancelled,
    Expired,
    Incomplete,
    Unknown(String),
}

impl RunStatus {
    /// Map a service status string, attaching `detail` to failures.
    pub fn parse(status: &str, detail: Option<String>) -> Self {
        match status {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "cancelling" => RunStatus::Cancelling,
            "completed" => RunStatus::Completed,
            "requires_action" => RunStatus::RequiresAction,
            "failed" => RunStatus::Failed(detail),
            "cancelled" => RunStatus::Cancelled,
            "expired" => RunStatus::Expired,
            "incomplete" => RunStatus::Incomplete,
            other => RunStatus::Unknown(other.to_string()),
        }
    }

    /// The run may still finish; keep polling.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling | RunStatus::Unknown(_)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Queued => f.write_str("queued"),
            RunStatus::InProgress => f.write_str("in_progress"),
            RunStatus::Cancelling => f.write_str("cancelling"),
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::RequiresAction => f.write_str("requires_action"),
            RunStatus::Failed(Some(detail)) => write!(f, "failed ({detail})"),
            RunStatus::Failed(None) => f.write_str("failed"),
            RunStatus::Cancelled => f.write_str("cancelled"),
            RunStatus::Expired => f.write_str("expired"),
            RunStatus::Incomplete => f.write_str("incomplete"),
            RunStatus::Unknown(s) => f.write_str(s),
        }
    }
}

/// Bounds on waiting for a run: capped exponential backoff between status
/// checks and a hard limit on the total wait.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay before the second status check, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for the delay between checks, in milliseconds.
    pub max_delay_ms: u64,
    /// Factor applied to the delay after each pending check.
    pub multiplier: u32,
    /// Total time allowed for the run, in milliseconds.
    pub max_wait_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 4_000,
            multiplier: 2,
            max_wait_ms: 120_000,
        }
    }
}

impl PollPolicy {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Delay following `current`, never above the cap.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.multiplier.max(1))
            .min(Duration::from_millis(self.max_delay_ms))
    }

    /// Call `check` until it reports a terminal status.
    ///
    /// `Completed` is success. Any other terminal status is
    /// [`RelayError::AssistantUnavailable`]; running past
    /// [`max_wait`](Self::max_wait) is [`RelayError::AssistantTimeout`].
    pub async fn wait_for<F, Fut>(&self, mut check: F) -> Result<(), RelayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RunStatus, RelayError>>,
    {
        let max_wait = self.max_wait();
        let polling = async {
            let mut delay = Duration::from_millis(self.initial_delay_ms);
            let mut checks = 0usize;
            loop {
                let status = check().await?;
                checks += 1;
                trace!(%status, checks, "run status");
                match status {
                    RunStatus::Completed => return Ok(()),
                    RunStatus::Unknown(ref s) => warn!(status = %s, "unrecognized run status"),
                    ref s if s.is_pending() => {}
                    other => {
                        return Err(RelayError::assistant(format!("run ended as {other}")));
                    }
                }
                tokio::time::sleep(delay).await;
                delay = self.next_delay(delay);
            }
        };
        tokio::time::timeout(max_wait, polling)
            .await
            .map_err(|_| RelayError::AssistantTimeout(max_wait))?
    }
}
