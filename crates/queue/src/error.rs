//! Queue error types.

use thiserror::Error;

use verdict_core::PayloadError;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Transport-level failure on enqueue or dequeue.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Malformed(#[from] PayloadError),

    #[error("queue config error: {0}")]
    Config(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        QueueError::Unavailable(e.to_string())
    }
}
