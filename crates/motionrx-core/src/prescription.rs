//! Patients and the prescriptions binding them to catalog exercises.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// A registered patient.
///
/// Only `id` ever leaves the engine in progress or coaching payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub birthdate: NaiveDate,
}

impl Patient {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::invalid("id", "must not be empty").into());
        }
        Ok(())
    }
}

/// Binds a patient to an exercise with a repetition target and daily cadence.
///
/// At most one prescription exists per (patient, exercise) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub exercise_id: String,
    /// Successful attempts required to meet the prescription
    pub repetitions_target: u32,
    /// Successful attempts expected per day
    #[serde(default = "default_daily_frequency")]
    pub daily_frequency: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

fn default_daily_frequency() -> u32 {
    1
}

impl Prescription {
    pub fn new(id: &str, patient_id: &str, exercise_id: &str, repetitions_target: u32) -> Self {
        Self {
            id: id.to_string(),
            patient_id: patient_id.to_string(),
            exercise_id: exercise_id.to_string(),
            repetitions_target,
            daily_frequency: default_daily_frequency(),
            notes: None,
            issued_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::invalid("id", "must not be empty").into());
        }
        if self.repetitions_target == 0 {
            return Err(ValidationError::invalid("repetitions_target", "must be positive").into());
        }
        if self.daily_frequency == 0 {
            return Err(ValidationError::invalid("daily_frequency", "must be positive").into());
        }
        Ok(())
    }

    /// Apply a clinician edit. Patient, exercise, and issue time never change.
    ///
    /// # Errors
    /// Returns a validation error if the edit would zero a count; the
    /// prescription is left untouched in that case.
    pub fn apply(&mut self, update: &PrescriptionUpdate) -> Result<()> {
        let mut edited = self.clone();
        if let Some(target) = update.repetitions_target {
            edited.repetitions_target = target;
        }
        if let Some(frequency) = update.daily_frequency {
            edited.daily_frequency = frequency;
        }
        if let Some(notes) = &update.notes {
            edited.notes = if notes.is_empty() { None } else { Some(notes.clone()) };
        }
        edited.validate()?;
        *self = edited;
        Ok(())
    }
}

/// The fields a clinician may edit after issuing a prescription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionUpdate {
    #[serde(default)]
    pub repetitions_target: Option<u32>,
    #[serde(default)]
    pub daily_frequency: Option<u32>,
    /// `Some("")` clears the notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl PrescriptionUpdate {
    pub fn is_empty(&self) -> bool {
        self.repetitions_target.is_none() && self.daily_frequency.is_none() && self.notes.is_none()
    }
}
