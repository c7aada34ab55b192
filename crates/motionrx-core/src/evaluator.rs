//! Deviation evaluator.
//!
//! Compares each submitted sample against the threshold with the same metric
//! name and produces a [`DeviationRecord`]. Evaluation is pure: the same sample
//! and threshold always produce the same record, so it is safe to run both
//! during scoring and in the clinician preview flow.

use serde::{Deserialize, Serialize};

use crate::catalog::ThresholdSet;
use crate::error::{CoreError, Result};
use crate::intake::{validate_batch, MetricSample};
use crate::threshold::{Comparator, Threshold};

/// Effective bound(s) a sample was scored against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "comparator", rename_all = "lowercase")]
pub enum Target {
    Gte { value: f64 },
    Lte { value: f64 },
    Between { low: f64, high: f64 },
}

impl Target {
    fn of(threshold: &Threshold) -> Result<Self> {
        Ok(match threshold.comparator {
            Comparator::Gte => Target::Gte {
                value: threshold.value,
            },
            Comparator::Lte => Target::Lte {
                value: threshold.value,
            },
            Comparator::Between => {
                let high = threshold.upper_bound().ok_or_else(|| {
                    CoreError::invalid_threshold(
                        &threshold.metric,
                        "secondary_value",
                        "is required for the between comparator",
                    )
                })?;
                Target::Between {
                    low: threshold.value,
                    high,
                }
            }
        })
    }

    /// Whether `actual` satisfies the target. All bounds are inclusive.
    pub fn is_met_by(&self, actual: f64) -> bool {
        match *self {
            Target::Gte { value } => actual >= value,
            Target::Lte { value } => actual <= value,
            Target::Between { low, high } => low <= actual && actual <= high,
        }
    }

    /// Signed distance from the satisfying region.
    ///
    /// `gte`/`lte` report the signed margin (positive when failing, zero or
    /// negative when passing). `between` is zero inside the range, negative
    /// below `low`, positive above `high`.
    pub fn delta(&self, actual: f64) -> f64 {
        match *self {
            Target::Gte { value } => value - actual,
            Target::Lte { value } => actual - value,
            Target::Between { low, high } => {
                if actual < low {
                    actual - low
                } else if actual > high {
                    actual - high
                } else {
                    0.0
                }
            }
        }
    }
}

/// Outcome of comparing one sample with its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationRecord {
    pub metric: String,
    /// `None` for an unmeasured (threshold-less) metric
    pub target: Option<Target>,
    pub actual: f64,
    pub unit: String,
    pub passed: bool,
    /// Copied from the matching threshold; `None` when unmeasured
    pub coaching_prompt: Option<String>,
    pub delta: f64,
}

impl DeviationRecord {
    /// Whether a threshold was defined for this metric.
    pub fn is_measured(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_failing(&self) -> bool {
        self.is_measured() && !self.passed
    }
}

/// Score one sample against its threshold, if any.
///
/// A metric with no threshold is recorded as informational: it passes by
/// convention and carries no coaching prompt.
///
/// # Errors
/// - [`CoreError::InvalidMeasurement`] for a non-finite value or a unit that
///   differs from the threshold's unit
/// - [`CoreError::InvalidThreshold`] if handed a threshold that fails validation
pub fn evaluate(sample: &MetricSample, threshold: Option<&Threshold>) -> Result<DeviationRecord> {
    if !sample.actual_value.is_finite() {
        return Err(CoreError::invalid_measurement(
            &sample.metric,
            format!("value is missing or not finite ({})", sample.actual_value),
        ));
    }

    let Some(threshold) = threshold else {
        return Ok(DeviationRecord {
            metric: sample.metric.clone(),
            target: None,
            actual: sample.actual_value,
            unit: sample.unit.clone(),
            passed: true,
            coaching_prompt: None,
            delta: 0.0,
        });
    };

    threshold.validate()?;
    if !sample.unit.is_empty() && sample.unit != threshold.unit {
        return Err(CoreError::invalid_measurement(
            &sample.metric,
            format!(
                "unit '{}' does not match threshold unit '{}'",
                sample.unit, threshold.unit
            ),
        ));
    }

    let target = Target::of(threshold)?;
    let actual = sample.actual_value;
    let delta = target.delta(actual);
    if !delta.is_finite() {
        return Err(CoreError::invalid_measurement(
            &sample.metric,
            format!("distance from target overflows ({actual} against {target:?})"),
        ));
    }
    Ok(DeviationRecord {
        metric: sample.metric.clone(),
        target: Some(target),
        actual,
        unit: threshold.unit.clone(),
        passed: target.is_met_by(actual),
        coaching_prompt: Some(threshold.coaching_prompt.clone()),
        delta,
    })
}

/// Validate and score a whole batch, preserving sample order.
///
/// Any invalid sample rejects the batch; no partial result is returned.
pub fn evaluate_batch(samples: &[MetricSample], thresholds: &ThresholdSet) -> Result<Vec<DeviationRecord>> {
    validate_batch(samples)?;
    samples
        .iter()
        .map(|sample| evaluate(sample, thresholds.get(&sample.metric)))
        .collect()
}

/// Conjunction of `passed` over threshold-matched records.
///
/// Unmeasured records never influence the result.
pub fn all_passed(records: &[DeviationRecord]) -> bool {
    records.iter().filter(|r| r.is_measured()).all(|r| r.passed)
}

/// Result of scoring samples without recording anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptPreview {
    pub success: bool,
    pub deviations: Vec<DeviationRecord>,
}

/// Clinician threshold-assist: score suggested samples with no side effects.
pub fn preview(samples: &[MetricSample], thresholds: &ThresholdSet) -> Result<AttemptPreview> {
    let deviations = evaluate_batch(samples, thresholds)?;
    Ok(AttemptPreview {
        success: all_passed(&deviations),
        deviations,
    })
}
