use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use verdict_core::Artifact;

use crate::error::ClassifyError;

/// Raw classifier answer, before validation and rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Opaque model call. May be slow; may fail.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, artifact: &Artifact) -> Result<Classification, ClassifyError>;
}

#[async_trait]
impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    async fn classify(&self, artifact: &Artifact) -> Result<Classification, ClassifyError> {
        (**self).classify(artifact).await
    }
}
