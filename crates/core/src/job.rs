//! Job descriptors and result records exchanged through the queue and result store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ArtifactKind;

/// Correlation ID linking a submitted job to its eventual result.
///
/// Content-addressed IDs have the shape `<sha256-hex>.<ext>`; random IDs
/// use a simple-format UUID v4 in place of the digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Fresh random token for job types that opt out of content addressing.
    pub fn random(kind: ArtifactKind) -> Self {
        Self(format!("{}.{}", Uuid::new_v4().simple(), kind.extension()))
    }

    pub(crate) fn from_digest(hex: &str, kind: ArtifactKind) -> Self {
        Self(format!("{hex}.{}", kind.extension()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unit of pending work. Created by the dispatcher, consumed once by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: JobId,
    /// Name the artifact store resolves to the artifact's bytes.
    pub artifact_ref: String,
    pub submitted_at: DateTime<Utc>,
}

impl JobDescriptor {
    pub fn new(id: JobId, artifact_ref: impl Into<String>) -> Self {
        Self {
            id,
            artifact_ref: artifact_ref.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Decimal places kept on published scores.
pub const SCORE_PRECISION: i32 = 4;

/// Round a score to [`SCORE_PRECISION`] decimal places.
pub fn round_score(score: f64) -> f64 {
    let scale = 10f64.powi(SCORE_PRECISION);
    (score * scale).round() / scale
}

/// Whether `score` is a usable confidence value.
pub fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=1.0).contains(&score)
}

/// Successful classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Prediction {
    #[serde(alias = "prediction")]
    pub label: String,
    #[serde(alias = "confidence")]
    pub score: f64,
}

/// Sentinel record stored when a job could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFailure {
    pub error: String,
}

/// Outcome stored in the result store under the job's correlation ID.
///
/// The two shapes never share fields on the wire: `{label, score}` or `{error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultRecord {
    Prediction(Prediction),
    Failure(JobFailure),
}

impl ResultRecord {
    /// Build a prediction record, rounding the score.
    pub fn prediction(label: impl Into<String>, score: f64) -> Self {
        ResultRecord::Prediction(Prediction {
            label: label.into(),
            score: round_score(score),
        })
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ResultRecord::Failure(JobFailure {
            error: error.into(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResultRecord::Failure(_))
    }

    pub fn as_prediction(&self) -> Option<&Prediction> {
        match self {
            ResultRecord::Prediction(p) => Some(p),
            ResultRecord::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ResultRecord::Failure(f) => Some(&f.error),
            ResultRecord::Prediction(_) => None,
        }
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultRecord::Prediction(p) => write!(f, "{} ({:.4})", p.label, p.score),
            ResultRecord::Failure(e) => write!(f, "error: {}", e.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_keep_extension_and_differ() {
        let a = JobId::random(ArtifactKind::Png);
        let b = JobId::random(ArtifactKind::Png);
        assert_ne!(a, b);
        assert!(a.as_str().ends_with(".png"));
        assert_eq!(a.as_str().len(), 32 + ".png".len());
    }

    #[test]
    fn scores_round_to_four_places() {
        assert_eq!(round_score(0.87344999), 0.8734);
        assert_eq!(round_score(0.12345678), 0.1235);
        assert_eq!(round_score(1.0), 1.0);
        assert_eq!(ResultRecord::prediction("cat", 0.99999).as_prediction().unwrap().score, 1.0);
    }

    #[test]
    fn score_validity() {
        assert!(is_valid_score(0.0));
        assert!(is_valid_score(1.0));
        assert!(!is_valid_score(1.5));
        assert!(!is_valid_score(-0.2));
        assert!(!is_valid_score(f64::NAN));
        assert!(!is_valid_score(f64::INFINITY));
    }

    #[test]
    fn record_accessors() {
        let ok = ResultRecord::prediction("tabby_cat", 0.8734);
        assert!(!ok.is_failure());
        assert_eq!(ok.error(), None);
        assert_eq!(ok.to_string(), "tabby_cat (0.8734)");

        let failed = ResultRecord::failure("model crashed");
        assert!(failed.is_failure());
        assert_eq!(failed.error(), Some("model crashed"));
        assert!(failed.as_prediction().is_none());
    }
}
