use std::time::Duration;

use thiserror::Error;

use verdict_core::InvalidArtifact;
use verdict_queue::QueueError;
use verdict_store::StoreError;

/// Why a submission was refused. The caller always learns about these;
/// a failed submission leaves no result record behind.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    InvalidArtifact(#[from] InvalidArtifact),

    #[error("could not enqueue job: {0}")]
    QueueUnavailable(#[from] QueueError),

    #[error("result/artifact store failed: {0}")]
    Store(#[from] StoreError),
}

/// Non-record outcomes of waiting for a result.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("no result after {0:?}")]
    Timeout(Duration),

    #[error("polling cancelled")]
    Cancelled,

    #[error("result store failed: {0}")]
    Store(#[from] StoreError),
}
