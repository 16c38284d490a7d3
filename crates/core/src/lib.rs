pub mod address;
pub mod artifact;
pub mod backoff;
pub mod config;
pub mod error;
pub mod job;
pub mod wire;

pub use address::address;
pub use artifact::{Artifact, ArtifactKind};
pub use backoff::Backoff;
pub use config::Config;
pub use error::{InvalidArtifact, PayloadError};
pub use job::{JobDescriptor, JobFailure, JobId, Prediction, ResultRecord};
pub use wire::{decode_result, encode_result};
