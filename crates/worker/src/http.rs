//! Classifier backed by a model-serving HTTP endpoint.
//!
//! The artifact is posted as the raw request body with its MIME type. The
//! endpoint answers with `{"label": .., "score": ..}`; the older
//! `{"prediction": .., "confidence": ..}` field names are accepted too.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use verdict_core::Artifact;

use crate::classifier::{Classification, Classifier};
use crate::error::ClassifyError;

pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Deserialize)]
struct Reply {
    #[serde(alias = "prediction")]
    label: String,
    #[serde(alias = "confidence")]
    score: f64,
}

fn parse_reply(body: &str) -> Result<Classification, ClassifyError> {
    let reply: Reply = serde_json::from_str(body)
        .map_err(|e| ClassifyError::Failed(format!("unreadable classifier reply: {e}")))?;
    Ok(Classification::new(reply.label, reply.score))
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, artifact: &Artifact) -> Result<Classification, ClassifyError> {
        debug!(url = %self.url, kind = %artifact.kind, size = artifact.len(), "classifier request");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", artifact.kind.mime_type())
            .body(artifact.bytes.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClassifyError::Failed(format!(
                "classifier returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        parse_reply(&body)
    }
}
