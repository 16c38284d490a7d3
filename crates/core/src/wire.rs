//! JSON wire format for result records.
//!
//! Records are validated in both directions: a prediction with a score
//! outside `[0, 1]` is never written and never accepted on read, and a body
//! mixing prediction and error fields is rejected as malformed.

use serde_json::Value;

use crate::error::PayloadError;
use crate::job::{is_valid_score, JobFailure, Prediction, ResultRecord};

/// Serialize a result record for storage.
pub fn encode_result(record: &ResultRecord) -> Result<String, PayloadError> {
    if let ResultRecord::Prediction(p) = record {
        check_score(p)?;
    }
    serde_json::to_string(record)
        .map_err(|e| PayloadError::new(format!("cannot encode result record: {e}")))
}

/// Parse a stored result record.
pub fn decode_result(body: &str) -> Result<ResultRecord, PayloadError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PayloadError::new(format!("result is not valid JSON: {e}")))?;

    let is_failure = match value.as_object() {
        Some(obj) => obj.contains_key("error"),
        None => return Err(PayloadError::new("result is not a JSON object")),
    };

    let record = if is_failure {
        serde_json::from_value::<JobFailure>(value).map(ResultRecord::Failure)
    } else {
        serde_json::from_value::<Prediction>(value).map(ResultRecord::Prediction)
    }
    .map_err(|e| PayloadError::new(format!("invalid result record: {e}")))?;

    if let ResultRecord::Prediction(p) = &record {
        check_score(p)?;
    }
    Ok(record)
}

fn check_score(p: &Prediction) -> Result<(), PayloadError> {
    if is_valid_score(p.score) {
        Ok(())
    } else {
        Err(PayloadError::new(format!(
            "score {} for label '{}' is outside [0, 1]",
            p.score, p.label
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_wire_shape() {
        let json = encode_result(&ResultRecord::prediction("tabby_cat", 0.8734)).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["label"], "tabby_cat");
        assert_eq!(value["score"], 0.8734);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_wire_shape() {
        let json = encode_result(&ResultRecord::failure("boom")).unwrap();
        assert_eq!(json, r#"{"error":"boom"}"#);
        assert_eq!(decode_result(&json).unwrap(), ResultRecord::failure("boom"));
    }

    #[test]
    fn accepts_legacy_field_names() {
        let record = decode_result(r#"{"prediction":"Egyptian_cat","score":0.5}"#).unwrap();
        assert_eq!(record, ResultRecord::prediction("Egyptian_cat", 0.5));

        let record = decode_result(r#"{"label":"tiger_cat","confidence":0.25}"#).unwrap();
        assert_eq!(record, ResultRecord::prediction("tiger_cat", 0.25));
    }

    #[test]
    fn mixed_shapes_are_malformed() {
        let err = decode_result(r#"{"label":"cat","score":0.5,"error":"x"}"#).unwrap_err();
        assert!(err.reason.contains("invalid result record"), "{err}");
        assert!(decode_result(r#"{"label":"cat","score":0.5,"extra":1}"#).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(decode_result("not json").is_err());
        assert!(decode_result("[1,2]").is_err());
        assert!(decode_result(r#"{"label":"cat"}"#).is_err());
        assert!(decode_result(r#"{"error":42}"#).is_err());
    }

    #[test]
    fn out_of_range_scores_rejected_both_ways() {
        let bad = ResultRecord::Prediction(Prediction {
            label: "cat".into(),
            score: 1.5,
        });
        assert!(encode_result(&bad).is_err());
        assert!(decode_result(r#"{"label":"cat","score":-0.2}"#).is_err());
    }
}
