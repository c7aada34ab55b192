mod config;
pub mod database;
pub mod memory;
pub mod migrations;

pub use config::{CoachingConfig, Config, LoggingConfig, StorageConfig};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::adherence::AdherenceSummary;
use crate::attempt::ProgressEvent;
use crate::catalog::Exercise;
use crate::error::{ConfigError, Result};
use crate::prescription::{Patient, Prescription};

/// Result of appending a progress event to its stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The event was appended; `summary` is the stream's adherence at commit time.
    Appended {
        event: ProgressEvent,
        summary: AdherenceSummary,
    },
    /// An event with the same attempt id already exists in the stream.
    Duplicate(ProgressEvent),
}

impl AppendOutcome {
    pub fn event(&self) -> &ProgressEvent {
        match self {
            AppendOutcome::Appended { event, .. } => event,
            AppendOutcome::Duplicate(event) => event,
        }
    }
}

/// Repository for the catalog, patients, prescriptions, and progress log.
///
/// Catalog reads may observe either side of a concurrent edit, but always a
/// whole exercise. `append_event` must be atomic per (patient, exercise)
/// stream and idempotent per attempt id.
pub trait Store: Send + Sync {
    /// # Errors
    /// [`CoreError::DuplicateExercise`](crate::CoreError::DuplicateExercise) if the id exists.
    fn insert_exercise(&self, exercise: &Exercise) -> Result<()>;
    /// # Errors
    /// [`CoreError::UnknownExercise`](crate::CoreError::UnknownExercise) if the id is absent.
    fn replace_exercise(&self, exercise: &Exercise) -> Result<()>;
    fn remove_exercise(&self, id: &str) -> Result<()>;
    fn exercise(&self, id: &str) -> Result<Option<Exercise>>;
    fn exercises(&self) -> Result<Vec<Exercise>>;

    fn insert_patient(&self, patient: &Patient) -> Result<()>;
    fn patient(&self, id: &str) -> Result<Option<Patient>>;

    /// # Errors
    /// [`CoreError::DuplicatePrescription`](crate::CoreError::DuplicatePrescription)
    /// if the id or the (patient, exercise) pair is taken.
    fn insert_prescription(&self, prescription: &Prescription) -> Result<()>;
    fn replace_prescription(&self, prescription: &Prescription) -> Result<()>;
    fn prescription(&self, id: &str) -> Result<Option<Prescription>>;
    fn prescription_for(&self, patient_id: &str, exercise_id: &str) -> Result<Option<Prescription>>;

    fn append_event(&self, event: ProgressEvent) -> Result<AppendOutcome>;
    /// Events in submission order; all of a patient's streams when `exercise_id` is `None`.
    fn events(&self, patient_id: &str, exercise_id: Option<&str>) -> Result<Vec<ProgressEvent>>;
}

impl<T: Store + ?Sized> Store for Box<T> {
    fn insert_exercise(&self, exercise: &Exercise) -> Result<()> {
        (**self).insert_exercise(exercise)
    }
    fn replace_exercise(&self, exercise: &Exercise) -> Result<()> {
        (**self).replace_exercise(exercise)
    }
    fn remove_exercise(&self, id: &str) -> Result<()> {
        (**self).remove_exercise(id)
    }
    fn exercise(&self, id: &str) -> Result<Option<Exercise>> {
        (**self).exercise(id)
    }
    fn exercises(&self) -> Result<Vec<Exercise>> {
        (**self).exercises()
    }
    fn insert_patient(&self, patient: &Patient) -> Result<()> {
        (**self).insert_patient(patient)
    }
    fn patient(&self, id: &str) -> Result<Option<Patient>> {
        (**self).patient(id)
    }
    fn insert_prescription(&self, prescription: &Prescription) -> Result<()> {
        (**self).insert_prescription(prescription)
    }
    fn replace_prescription(&self, prescription: &Prescription) -> Result<()> {
        (**self).replace_prescription(prescription)
    }
    fn prescription(&self, id: &str) -> Result<Option<Prescription>> {
        (**self).prescription(id)
    }
    fn prescription_for(&self, patient_id: &str, exercise_id: &str) -> Result<Option<Prescription>> {
        (**self).prescription_for(patient_id, exercise_id)
    }
    fn append_event(&self, event: ProgressEvent) -> Result<AppendOutcome> {
        (**self).append_event(event)
    }
    fn events(&self, patient_id: &str, exercise_id: Option<&str>) -> Result<Vec<ProgressEvent>> {
        (**self).events(patient_id, exercise_id)
    }
}

/// Returns the motionrx data directory, creating it if needed.
///
/// `MOTIONRX_DATA_DIR` overrides the location. Otherwise
/// `~/.config/motionrx[-dev]/` based on `MOTIONRX_ENV`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("MOTIONRX_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("MOTIONRX_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("motionrx-dev")
            } else {
                base_dir.join("motionrx")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
