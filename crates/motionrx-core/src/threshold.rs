//! Clinician-defined pass/fail rules for a single body metric.
//!
//! A [`Threshold`] is attached to an exercise step and compares one named
//! metric against a bound (`gte`, `lte`) or an inclusive range (`between`).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Comparison applied between a measured value and the threshold bound(s).
///
/// Accepts the literal operators `>=` / `<=` on input for compatibility with
/// older portal payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// `actual >= value`
    #[default]
    #[serde(alias = ">=")]
    Gte,
    /// `actual <= value`
    #[serde(alias = "<=")]
    Lte,
    /// `value <= actual <= secondary_value`
    Between,
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Comparator::Gte => "gte",
            Comparator::Lte => "lte",
            Comparator::Between => "between",
        };
        f.write_str(s)
    }
}

/// A measurable target for one metric of an exercise step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Metric identifier, e.g. `neck_rotation_left`
    pub metric: String,
    #[serde(default)]
    pub comparator: Comparator,
    /// Primary bound (lower bound for `between`)
    pub value: f64,
    /// Upper bound, required iff the comparator is `between`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<f64>,
    /// Display unit, e.g. `deg` or `mm`
    pub unit: String,
    /// Patient-facing guidance for meeting the threshold
    pub coaching_prompt: String,
}

impl Threshold {
    pub fn gte(metric: &str, value: f64, unit: &str, coaching_prompt: &str) -> Self {
        Self::with_comparator(metric, Comparator::Gte, value, None, unit, coaching_prompt)
    }

    pub fn lte(metric: &str, value: f64, unit: &str, coaching_prompt: &str) -> Self {
        Self::with_comparator(metric, Comparator::Lte, value, None, unit, coaching_prompt)
    }

    pub fn between(metric: &str, low: f64, high: f64, unit: &str, coaching_prompt: &str) -> Self {
        Self::with_comparator(metric, Comparator::Between, low, Some(high), unit, coaching_prompt)
    }

    fn with_comparator(
        metric: &str,
        comparator: Comparator,
        value: f64,
        secondary_value: Option<f64>,
        unit: &str,
        coaching_prompt: &str,
    ) -> Self {
        Self {
            metric: metric.to_string(),
            comparator,
            value,
            secondary_value,
            unit: unit.to_string(),
            coaching_prompt: coaching_prompt.to_string(),
        }
    }

    /// Validate the threshold as authored by a clinician.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidThreshold`] naming the first offending field.
    /// Values are never coerced.
    pub fn validate(&self) -> Result<()> {
        if self.metric.trim().is_empty() {
            return Err(CoreError::invalid_threshold(&self.metric, "metric", "must not be empty"));
        }
        if !self.value.is_finite() {
            return Err(CoreError::invalid_threshold(
                &self.metric,
                "value",
                format!("must be finite, got {}", self.value),
            ));
        }
        if self.comparator == Comparator::Between {
            match self.secondary_value {
                None => {
                    return Err(CoreError::invalid_threshold(
                        &self.metric,
                        "secondary_value",
                        "is required for the between comparator",
                    ));
                }
                Some(upper) if !upper.is_finite() => {
                    return Err(CoreError::invalid_threshold(
                        &self.metric,
                        "secondary_value",
                        format!("must be finite, got {upper}"),
                    ));
                }
                Some(upper) if upper < self.value => {
                    return Err(CoreError::invalid_threshold(
                        &self.metric,
                        "secondary_value",
                        format!("must be >= value ({upper} < {})", self.value),
                    ));
                }
                Some(_) => {}
            }
        }
        if self.coaching_prompt.trim().is_empty() {
            return Err(CoreError::invalid_threshold(
                &self.metric,
                "coaching_prompt",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Upper bound for `between`; `None` for the single-bound comparators.
    pub fn upper_bound(&self) -> Option<f64> {
        match self.comparator {
            Comparator::Between => self.secondary_value,
            Comparator::Gte | Comparator::Lte => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: CoreError) -> String {
        match err {
            CoreError::InvalidThreshold { field, .. } => field,
            other => panic!("expected InvalidThreshold, got {other:?}"),
        }
    }

    #[test]
    fn valid_thresholds_pass() {
        Threshold::gte("neck_rotation_left", 60.0, "deg", "Turn further left")
            .validate()
            .unwrap();
        Threshold::lte("jaw_deviation", 2.0, "mm", "Keep your jaw centred")
            .validate()
            .unwrap();
        Threshold::between("mouth_opening", 20.0, 40.0, "mm", "Open gently")
            .validate()
            .unwrap();
    }

    #[test]
    fn between_allows_equal_bounds() {
        Threshold::between("mouth_opening", 30.0, 30.0, "mm", "Hold at 30")
            .validate()
            .unwrap();
    }

    #[test]
    fn rejects_empty_metric() {
        let t = Threshold::gte("  ", 60.0, "deg", "Turn");
        assert_eq!(field_of(t.validate().unwrap_err()), "metric");
    }

    #[test]
    fn rejects_non_finite_value() {
        let t = Threshold::gte("neck_rotation_left", f64::NAN, "deg", "Turn");
        assert_eq!(field_of(t.validate().unwrap_err()), "value");
        let t = Threshold::lte("neck_rotation_left", f64::INFINITY, "deg", "Turn");
        assert_eq!(field_of(t.validate().unwrap_err()), "value");
    }

    #[test]
    fn between_requires_ordered_secondary_value() {
        let mut t = Threshold::between("mouth_opening", 20.0, 40.0, "mm", "Open");
        t.secondary_value = None;
        assert_eq!(field_of(t.validate().unwrap_err()), "secondary_value");

        let t = Threshold::between("mouth_opening", 40.0, 20.0, "mm", "Open");
        assert_eq!(field_of(t.validate().unwrap_err()), "secondary_value");
    }

    #[test]
    fn non_between_ignores_secondary_value() {
        let mut t = Threshold::gte("neck_rotation_left", 60.0, "deg", "Turn");
        t.secondary_value = Some(-5.0);
        t.validate().unwrap();
        assert_eq!(t.upper_bound(), None);
    }

    #[test]
    fn rejects_missing_coaching_prompt() {
        let t = Threshold::gte("neck_rotation_left", 60.0, "deg", "");
        assert_eq!(field_of(t.validate().unwrap_err()), "coaching_prompt");
    }

    #[test]
    fn comparator_accepts_operator_literals() {
        let t: Threshold = serde_json::from_str(
            r#"{"metric":"neck_rotation_left","comparator":">=","value":60,"unit":"deg","coaching_prompt":"Turn"}"#,
        )
        .unwrap();
        assert_eq!(t.comparator, Comparator::Gte);

        let t: Threshold = serde_json::from_str(
            r#"{"metric":"jaw_deviation","comparator":"<=","value":2,"unit":"mm","coaching_prompt":"Centre"}"#,
        )
        .unwrap();
        assert_eq!(t.comparator, Comparator::Lte);
    }

    #[test]
    fn comparator_defaults_to_gte() {
        let t: Threshold = serde_json::from_str(
            r#"{"metric":"reps","value":10,"unit":"count","coaching_prompt":"Keep going"}"#,
        )
        .unwrap();
        assert_eq!(t.comparator, Comparator::Gte);
        assert_eq!(serde_json::to_value(t.comparator).unwrap(), "gte");
    }
}
