//! Job queue trait and types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use verdict_core::JobDescriptor;

use crate::error::QueueError;

/// Health status of a queue connection.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    /// Whether the queue is reachable.
    pub connected: bool,
    /// Approximate number of jobs waiting in the queue.
    pub approximate_depth: Option<u64>,
    /// Queue provider name (e.g., "memory", "redis").
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueHealth {{ connected: {}, depth: {:?}, provider: {} }}",
            self.connected, self.approximate_depth, self.provider
        )
    }
}

/// Ordered channel of pending jobs shared by dispatchers and workers.
///
/// Implementations must be safe to call from many producers and consumers at
/// once without caller-side locking. Each enqueued descriptor is handed to
/// exactly one `dequeue` caller, oldest first.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job to the tail of the queue.
    async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError>;

    /// Remove and return the oldest job, waiting up to `timeout` for one.
    ///
    /// Returns `Ok(None)` when the queue stayed empty. A payload that cannot be
    /// decoded is still removed and reported as [`QueueError::Malformed`].
    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError>;

    /// Check queue connectivity and return health status.
    async fn health_check(&self) -> Result<QueueHealth, QueueError>;
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        (**self).enqueue(job).await
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
        (**self).dequeue(timeout).await
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        (**self).health_check().await
    }
}
