//! Attempt scoring state machine and the progress events it produces.
//!
//! ```text
//! Pending --score()--> Scored(Success | Failure) --into_event()--> ProgressEvent
//! ```
//!
//! A rejected batch leaves the attempt `Pending` and produces no event.
//! A scored attempt is never re-scored; corrections require a new attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ThresholdSet;
use crate::error::{CoreError, Result};
use crate::evaluator::{all_passed, evaluate_batch, DeviationRecord};
use crate::intake::{AttemptSubmission, MetricSample};
use crate::prescription::Prescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

impl AttemptOutcome {
    pub fn is_success(self) -> bool {
        self == AttemptOutcome::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptState {
    Pending,
    Scored(AttemptOutcome),
}

/// Key of one append-only progress stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub patient_id: String,
    pub exercise_id: String,
}

impl StreamKey {
    pub fn new(patient_id: &str, exercise_id: &str) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            exercise_id: exercise_id.to_string(),
        }
    }
}

/// A recorded, scored attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: String,
    pub attempt_id: String,
    pub prescription_id: String,
    pub patient_id: String,
    pub exercise_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    pub timestamp: DateTime<Utc>,
    /// True iff every threshold-bearing metric passed
    pub success: bool,
    pub deviations: Vec<DeviationRecord>,
}

impl ProgressEvent {
    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(&self.patient_id, &self.exercise_id)
    }

    pub fn failing(&self) -> impl Iterator<Item = &DeviationRecord> {
        self.deviations.iter().filter(|r| r.is_failing())
    }
}

/// One attempt moving through scoring.
#[derive(Debug, Clone)]
pub struct Attempt {
    attempt_id: String,
    prescription_id: String,
    patient_id: String,
    exercise_id: String,
    step_index: Option<u32>,
    samples: Vec<MetricSample>,
    captured_at: Option<DateTime<Utc>>,
    state: AttemptState,
    deviations: Vec<DeviationRecord>,
    scored_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn new(prescription: &Prescription, submission: AttemptSubmission) -> Self {
        Self {
            attempt_id: submission.attempt_id,
            prescription_id: prescription.id.clone(),
            patient_id: prescription.patient_id.clone(),
            exercise_id: prescription.exercise_id.clone(),
            step_index: submission.step_index,
            samples: submission.samples,
            captured_at: submission.captured_at,
            state: AttemptState::Pending,
            deviations: Vec::new(),
            scored_at: None,
        }
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn deviations(&self) -> &[DeviationRecord] {
        &self.deviations
    }

    /// Score the samples against `thresholds` (AND semantics, no partial credit).
    ///
    /// # Errors
    /// - [`CoreError::AttemptAlreadyScored`] if called twice
    /// - any intake/evaluation error; the attempt then stays `Pending`
    pub fn score(&mut self, thresholds: &ThresholdSet) -> Result<AttemptOutcome> {
        if let AttemptState::Scored(_) = self.state {
            return Err(CoreError::AttemptAlreadyScored(self.attempt_id.clone()));
        }

        let deviations = evaluate_batch(&self.samples, thresholds)?;
        let outcome = if all_passed(&deviations) {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::Failure
        };

        self.deviations = deviations;
        self.scored_at = Some(Utc::now());
        self.state = AttemptState::Scored(outcome);
        Ok(outcome)
    }

    /// Freeze a scored attempt into its progress event.
    pub fn into_event(self) -> Result<ProgressEvent> {
        let (outcome, scored_at) = match (self.state, self.scored_at) {
            (AttemptState::Scored(outcome), Some(at)) => (outcome, at),
            _ => return Err(CoreError::AttemptNotScored(self.attempt_id)),
        };

        Ok(ProgressEvent {
            id: Uuid::new_v4().to_string(),
            attempt_id: self.attempt_id,
            prescription_id: self.prescription_id,
            patient_id: self.patient_id,
            exercise_id: self.exercise_id,
            step_index: self.step_index,
            timestamp: self.captured_at.unwrap_or(scored_at),
            success: outcome.is_success(),
            deviations: self.deviations,
        })
    }
}
