//! Encode job descriptors for the queue and parse them back.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use verdict_core::{JobDescriptor, JobId, PayloadError};

/// Field names accepted for the artifact reference (tried in order).
/// `image_name` is what older producers send.
const ARTIFACT_REF_KEYS: &[&str] = &["artifact_ref", "image_name"];

/// Field names accepted for the submission timestamp.
const TIMESTAMP_KEYS: &[&str] = &["submitted_at", "timestamp"];

/// Serialize a descriptor into its queue wire form.
pub fn encode_job(job: &JobDescriptor) -> Result<String, PayloadError> {
    serde_json::to_string(job).map_err(|e| {
        PayloadError::new(format!("cannot encode job: {e}")).with_id(job.id.as_str())
    })
}

/// Parse a queue body into a [`JobDescriptor`].
///
/// `id` and an artifact reference are required and must be non-empty
/// strings. A missing or unparseable timestamp falls back to now. When the
/// body is rejected after the `id` was read, the error carries that `id`.
pub fn parse_job(body: &str) -> Result<JobDescriptor, PayloadError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| PayloadError::new(format!("job is not valid JSON: {e}")))?;

    let obj = json
        .as_object()
        .ok_or_else(|| PayloadError::new("job body is not a JSON object"))?;

    let id = non_empty_str(obj, "id").ok_or_else(|| PayloadError::new("job has no string `id`"))?;

    let artifact_ref = ARTIFACT_REF_KEYS
        .iter()
        .find_map(|k| non_empty_str(obj, k))
        .ok_or_else(|| {
            PayloadError::new("job has no string `artifact_ref`").with_id(id)
        })?;

    let submitted_at = TIMESTAMP_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now);

    Ok(JobDescriptor {
        id: JobId::from(id),
        artifact_ref: artifact_ref.to_string(),
        submitted_at,
    })
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}
