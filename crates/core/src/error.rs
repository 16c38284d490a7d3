use thiserror::Error;

/// Rejection raised by the content addresser for unusable artifacts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidArtifact {
    #[error("invalid artifact: content is empty")]
    Empty,

    #[error("invalid artifact: missing file extension")]
    MissingExtension,

    #[error("invalid artifact: unrecognized extension '{0}'")]
    UnrecognizedExtension(String),
}

/// A queue or result payload that failed validation at the serialization boundary.
///
/// `id` carries the correlation ID when it could still be recovered from the
/// payload, so consumers can publish an error record for it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed payload: {reason}")]
pub struct PayloadError {
    pub id: Option<String>,
    pub reason: String,
}

impl PayloadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            id: None,
            reason: reason.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
