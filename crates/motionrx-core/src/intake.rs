//! Metric sample intake.
//!
//! Raw measurement batches arrive one per attempt. A batch is accepted or
//! rejected as a whole: a single bad sample rejects the attempt, nothing is
//! partially scored, and nothing is silently dropped or repaired.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// One measured value for a named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric: String,
    /// A missing or `null` value decodes as NaN and is rejected by validation
    #[serde(default = "missing_value", deserialize_with = "nullable_value")]
    pub actual_value: f64,
    #[serde(default)]
    pub unit: String,
}

fn missing_value() -> f64 {
    f64::NAN
}

fn nullable_value<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl MetricSample {
    pub fn new(metric: &str, actual_value: f64, unit: &str) -> Self {
        Self {
            metric: metric.to_string(),
            actual_value,
            unit: unit.to_string(),
        }
    }
}

/// One attempt's worth of samples as submitted by the patient app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSubmission {
    /// Idempotency key; resubmitting the same id never records a second event
    #[serde(default = "new_attempt_id")]
    pub attempt_id: String,
    /// Step being graded; `None` grades against every step of the exercise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    pub samples: Vec<MetricSample>,
    /// Capture time reported by the client; defaults to the scoring time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

fn new_attempt_id() -> String {
    Uuid::new_v4().to_string()
}

impl AttemptSubmission {
    /// New submission with a freshly generated attempt id.
    pub fn new(samples: Vec<MetricSample>) -> Self {
        Self {
            attempt_id: new_attempt_id(),
            step_index: None,
            samples,
            captured_at: None,
        }
    }

    pub fn with_attempt_id(mut self, attempt_id: &str) -> Self {
        self.attempt_id = attempt_id.to_string();
        self
    }

    pub fn for_step(mut self, step_index: u32) -> Self {
        self.step_index = Some(step_index);
        self
    }
}

/// Validate a measurement batch before any scoring happens.
///
/// # Errors
/// - [`CoreError::EmptyAttempt`] when the batch has no samples
/// - [`CoreError::InvalidMeasurement`] for a blank metric name, a missing or
///   non-finite value, or a metric reported twice
pub fn validate_batch(samples: &[MetricSample]) -> Result<()> {
    if samples.is_empty() {
        return Err(CoreError::EmptyAttempt);
    }

    let mut seen = HashSet::with_capacity(samples.len());
    for sample in samples {
        if sample.metric.trim().is_empty() {
            return Err(CoreError::invalid_measurement(
                &sample.metric,
                "metric name must not be empty",
            ));
        }
        if !sample.actual_value.is_finite() {
            return Err(CoreError::invalid_measurement(
                &sample.metric,
                format!("value is missing or not finite ({})", sample.actual_value),
            ));
        }
        if !seen.insert(sample.metric.as_str()) {
            return Err(CoreError::invalid_measurement(
                &sample.metric,
                "metric reported more than once in the same attempt",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_batch() {
        let batch = vec![
            MetricSample::new("neck_rotation_left", 48.2, "deg"),
            MetricSample::new("neck_rotation_right", 61.0, "deg"),
        ];
        validate_batch(&batch).unwrap();
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(validate_batch(&[]), Err(CoreError::EmptyAttempt)));
    }

    #[test]
    fn non_finite_value_rejects_whole_batch() {
        let batch = vec![
            MetricSample::new("neck_rotation_left", 48.2, "deg"),
            MetricSample::new("neck_rotation_right", f64::NAN, "deg"),
        ];
        match validate_batch(&batch) {
            Err(CoreError::InvalidMeasurement { metric, .. }) => {
                assert_eq!(metric, "neck_rotation_right")
            }
            other => panic!("unexpected: {other:?}"),
        }

        let batch = vec![MetricSample::new("mouth_opening", f64::NEG_INFINITY, "mm")];
        assert!(matches!(
            validate_batch(&batch),
            Err(CoreError::InvalidMeasurement { .. })
        ));
    }

    #[test]
    fn duplicate_metric_is_rejected() {
        let batch = vec![
            MetricSample::new("mouth_opening", 30.0, "mm"),
            MetricSample::new("mouth_opening", 31.0, "mm"),
        ];
        assert!(matches!(
            validate_batch(&batch),
            Err(CoreError::InvalidMeasurement { .. })
        ));
    }

    #[test]
    fn null_or_missing_value_decodes_as_invalid() {
        let sample: MetricSample =
            serde_json::from_str(r#"{"metric":"mouth_opening","actual_value":null}"#).unwrap();
        assert!(sample.actual_value.is_nan());
        let sample: MetricSample = serde_json::from_str(r#"{"metric":"mouth_opening"}"#).unwrap();
        assert!(validate_batch(&[sample]).is_err());
    }

    #[test]
    fn submission_generates_attempt_id_when_absent() {
        let sub: AttemptSubmission = serde_json::from_str(
            r#"{"samples":[{"metric":"mouth_opening","actual_value":30,"unit":"mm"}]}"#,
        )
        .unwrap();
        assert!(!sub.attempt_id.is_empty());
        assert!(sub.step_index.is_none());
    }
}
