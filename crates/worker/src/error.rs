use std::time::Duration;

use verdict_core::InvalidArtifact;
use verdict_store::StoreError;

/// Why a classifier call did not produce a usable answer.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification failed: {0}")]
    Failed(String),
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),
    #[error("classifier panicked")]
    Panicked,
    #[error("classifier returned confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),
}

/// Per-job failure. Rendered into the error record a poller receives.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Artifact(#[from] StoreError),
    #[error(transparent)]
    Kind(#[from] InvalidArtifact),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}
