//! Core error types for motionrx-core.
//!
//! Every failure in the engine is scoped to one request. Input errors
//! (bad thresholds, bad measurements, unknown ids) are never retryable
//! without corrected input; storage contention is.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for motionrx-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Clinician-authored threshold rejected at authoring time
    #[error("Invalid threshold for metric '{metric}': {field} {message}")]
    InvalidThreshold {
        metric: String,
        field: String,
        message: String,
    },

    /// A submitted sample is missing a value, non-finite, or ambiguous
    #[error("Invalid measurement for metric '{metric}': {message}")]
    InvalidMeasurement { metric: String, message: String },

    /// An attempt was submitted with no samples
    #[error("Attempt contains no metric samples")]
    EmptyAttempt,

    #[error("Exercise not found: {0}")]
    UnknownExercise(String),

    #[error("Exercise '{exercise_id}' has no step with index {index}")]
    UnknownStep { exercise_id: String, index: u32 },

    #[error("Prescription not found: {0}")]
    UnknownPrescription(String),

    #[error("Patient not found: {0}")]
    UnknownPatient(String),

    #[error("Exercise already exists: {0}")]
    DuplicateExercise(String),

    #[error("Patient already exists: {0}")]
    DuplicatePatient(String),

    /// Prescription id reused, or the (patient, exercise) pair already prescribed
    #[error("Prescription already exists: {0}")]
    DuplicatePrescription(String),

    #[error("Attempt '{0}' has already been scored")]
    AttemptAlreadyScored(String),

    #[error("Attempt '{0}' has not been scored yet")]
    AttemptNotScored(String),

    /// Another writer holds the progress stream; safe to retry with the same attempt id
    #[error("Concurrent append conflict on progress stream ({patient_id}, {exercise_id})")]
    AppendConflict {
        patient_id: String,
        exercise_id: String,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Structural validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn invalid_threshold(
        metric: impl Into<String>,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::InvalidThreshold {
            metric: metric.into(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_measurement(metric: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InvalidMeasurement {
            metric: metric.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may resubmit the identical request.
    ///
    /// Retrying with the same attempt id never double-counts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::AppendConflict { .. } | CoreError::Database(DatabaseError::Locked)
        )
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt row in '{table}': {message}")]
    CorruptRow { table: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A writer panicked while holding a store lock
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to locate or create the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked
                    || err.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        let conflict = CoreError::AppendConflict {
            patient_id: "p1".into(),
            exercise_id: "jaw-open".into(),
        };
        assert!(conflict.is_retryable());
        assert!(CoreError::Database(DatabaseError::Locked).is_retryable());

        assert!(!CoreError::EmptyAttempt.is_retryable());
        assert!(!CoreError::UnknownPrescription("rx-1".into()).is_retryable());
        assert!(!CoreError::invalid_measurement("neck_rotation_left", "NaN").is_retryable());
    }

    #[test]
    fn invalid_threshold_names_the_field() {
        let err = CoreError::invalid_threshold("neck_rotation_left", "coaching_prompt", "must not be empty");
        let message = err.to_string();
        assert!(message.contains("coaching_prompt"));
        assert!(message.contains("neck_rotation_left"));
    }

    #[test]
    fn busy_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }
}
