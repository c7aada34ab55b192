use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, ValidationError};
use crate::threshold::Threshold;

/// Rendering style for a step's demonstration video.
///
/// Serialized as `"real"` for clinician footage or `"avatar:<id>"` for a
/// generated avatar variant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AvatarStyle {
    #[default]
    Real,
    Avatar(String),
}

impl fmt::Display for AvatarStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvatarStyle::Real => f.write_str("real"),
            AvatarStyle::Avatar(id) => write!(f, "avatar:{id}"),
        }
    }
}

impl From<AvatarStyle> for String {
    fn from(style: AvatarStyle) -> Self {
        style.to_string()
    }
}

impl TryFrom<String> for AvatarStyle {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if value == "real" {
            return Ok(AvatarStyle::Real);
        }
        match value.strip_prefix("avatar:") {
            Some(id) if !id.is_empty() => Ok(AvatarStyle::Avatar(id.to_string())),
            _ => Err(format!(
                "invalid avatar style '{value}', expected 'real' or 'avatar:<id>'"
            )),
        }
    }
}

/// One step of an exercise, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseStep {
    /// Position within the exercise; unique and increasing
    pub index: u32,
    pub title: String,
    pub description: String,
    #[serde(default, alias = "video_url", skip_serializing_if = "Option::is_none")]
    pub video_reference: Option<String>,
    #[serde(default)]
    pub avatar_style: AvatarStyle,
    /// Empty when the step has no automated grading
    #[serde(default)]
    pub thresholds: Vec<Threshold>,
}

impl ExerciseStep {
    pub fn new(index: u32, title: &str, description: &str) -> Self {
        Self {
            index,
            title: title.to_string(),
            description: description.to_string(),
            video_reference: None,
            avatar_style: AvatarStyle::Real,
            thresholds: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    pub fn is_graded(&self) -> bool {
        !self.thresholds.is_empty()
    }
}

/// A prescribable exercise. Owns its steps and their thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    /// Symptom category used for catalog filtering, e.g. `tmj`
    pub symptom: String,
    pub title: String,
    pub description: String,
    pub steps: Vec<ExerciseStep>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Exercise {
    pub fn new(id: &str, symptom: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            symptom: symptom.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_step(mut self, step: ExerciseStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step(&self, index: u32) -> Option<&ExerciseStep> {
        self.steps.iter().find(|s| s.index == index)
    }

    /// Check structural invariants and every threshold.
    ///
    /// # Errors
    /// - [`ValidationError`] for a blank id, no steps, or out-of-order step indices
    /// - [`CoreError::InvalidThreshold`] for a bad threshold or a metric graded
    ///   twice within one step
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::invalid("id", "must not be empty").into());
        }
        if self.steps.is_empty() {
            return Err(
                ValidationError::EmptyCollection(format!("exercise '{}' has no steps", self.id))
                    .into(),
            );
        }

        let mut previous: Option<u32> = None;
        for step in &self.steps {
            if let Some(prev) = previous {
                if step.index <= prev {
                    return Err(ValidationError::invalid(
                        "steps.index",
                        format!(
                            "step indices must be unique and increasing ({} follows {prev})",
                            step.index
                        ),
                    )
                    .into());
                }
            }
            previous = Some(step.index);

            let mut seen = HashSet::new();
            for threshold in &step.thresholds {
                threshold.validate()?;
                if !seen.insert(threshold.metric.as_str()) {
                    return Err(CoreError::invalid_threshold(
                        &threshold.metric,
                        "metric",
                        format!("is graded more than once in step {}", step.index),
                    ));
                }
            }
        }
        Ok(())
    }
}
