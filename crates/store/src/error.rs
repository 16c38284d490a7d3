use thiserror::Error;

use verdict_core::PayloadError;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure talking to the backing store.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Malformed(#[from] PayloadError),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("invalid artifact reference: {0}")]
    InvalidRef(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store config error: {0}")]
    Config(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
