//! Caller side: wait for a job's result without blocking past a deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use verdict_core::config::PollConfig;
use verdict_core::{Backoff, JobId, ResultRecord};
use verdict_store::ResultStore;

use crate::error::PollError;

/// How long and how often to check for a result.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub max_wait: Duration,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl PollPolicy {
    pub fn new(max_wait: Duration, interval: Duration) -> Self {
        Self {
            max_wait,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn from_config(cfg: &PollConfig) -> Self {
        Self {
            max_wait: cfg.max_wait(),
            interval: cfg.interval(),
            backoff: Backoff::from_poll_config(cfg),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_millis(100))
    }
}

pub struct Poller {
    results: Arc<dyn ResultStore>,
}

impl Poller {
    pub fn new(results: Arc<dyn ResultStore>) -> Self {
        Self { results }
    }

    /// Poll the result store until a record for `id` appears.
    ///
    /// Returns the stored record (which may be an error record), or
    /// [`PollError::Timeout`] once `max_wait` has elapsed, or
    /// [`PollError::Cancelled`] as soon as `cancel` fires. With a zero
    /// `max_wait` exactly one lookup is made.
    #[instrument(skip(self, policy, cancel), fields(job_id = %id))]
    pub async fn await_result(
        &self,
        id: &JobId,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<ResultRecord, PollError> {
        let started = Instant::now();
        // None when max_wait is too large to represent: wait without a deadline.
        let deadline = started.checked_add(policy.max_wait);
        let mut delay = policy.interval;
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            attempts += 1;
            if let Some(record) = self.results.get(id).await? {
                debug!(attempts, elapsed = ?started.elapsed(), "result ready");
                return Ok(record);
            }

            let sleep_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(attempts, "gave up waiting");
                        return Err(PollError::Timeout(policy.max_wait));
                    }
                    delay.min(deadline - now)
                }
                None => delay,
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(sleep_for) => {}
            }
            delay = policy.backoff.next(delay);
        }
    }
}
