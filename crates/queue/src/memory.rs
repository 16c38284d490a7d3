//! In-process FIFO queue.
//!
//! Holds the encoded wire form of each job so payload validation behaves the
//! same as on a networked backend.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use verdict_core::JobDescriptor;

use crate::error::QueueError;
use crate::parser::{encode_job, parse_job};
use crate::queue::{JobQueue, QueueHealth};

#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw body, bypassing encoding. Used to inject payloads from
    /// foreign producers.
    pub async fn push_raw(&self, body: impl Into<String>) {
        self.items.lock().await.push_back(body.into());
        self.available.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        let body = encode_job(job)?;
        debug!(job_id = %job.id, "enqueue");
        self.push_raw(body).await;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
        // None when the timeout is too large to represent: wait indefinitely.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            // Register interest before checking so a push between the check and
            // the wait still wakes us.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(body) = self.items.lock().await.pop_front() {
                return parse_job(&body).map(Some).map_err(QueueError::from);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: true,
            approximate_depth: Some(self.len().await as u64),
            provider: "memory".to_string(),
        })
    }
}
