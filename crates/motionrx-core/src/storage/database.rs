//! SQLite-backed store.
//!
//! Provides persistent storage for:
//! - The exercise catalog (one JSON document per exercise)
//! - Patients and prescriptions
//! - The append-only progress event log
//!
//! Appends run in an immediate transaction, so the duplicate check, insert,
//! and stream summary are one atomic step per database.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use crate::adherence::AdherenceSummary;
use crate::attempt::ProgressEvent;
use crate::catalog::Exercise;
use crate::error::{CoreError, DatabaseError, Result};
use crate::prescription::{Patient, Prescription};

use super::{data_dir, migrations, AppendOutcome, Store};

const EVENT_COLUMNS: &str = "id, attempt_id, prescription_id, patient_id, exercise_id, step_index, recorded_at, success, deviations";
const PRESCRIPTION_COLUMNS: &str =
    "id, patient_id, exercise_id, repetitions_target, daily_frequency, notes, issued_at";

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ProgressEvent> {
    let deviations: String = row.get(8)?;
    Ok(ProgressEvent {
        id: row.get(0)?,
        attempt_id: row.get(1)?,
        prescription_id: row.get(2)?,
        patient_id: row.get(3)?,
        exercise_id: row.get(4)?,
        step_index: row.get(5)?,
        timestamp: parse_timestamp(row, 6)?,
        success: row.get::<_, i32>(7)? != 0,
        deviations: serde_json::from_str(&deviations).map_err(|e| conversion_error(8, e))?,
    })
}

fn prescription_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        exercise_id: row.get(2)?,
        repetitions_target: row.get(3)?,
        daily_frequency: row.get(4)?,
        notes: row.get(5)?,
        issued_at: parse_timestamp(row, 6)?,
    })
}

fn exercise_from_body(body: &str) -> Result<Exercise> {
    serde_json::from_str(body).map_err(|e| {
        DatabaseError::CorruptRow {
            table: "exercises".into(),
            message: e.to_string(),
        }
        .into()
    })
}

/// SQLite database implementing [`Store`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database file named `database_file` inside the data directory.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(database_file: &str) -> Result<Self> {
        let path = data_dir()?.join(database_file);
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::Poisoned.into())
    }

    fn append_in_transaction(conn: &mut Connection, event: &ProgressEvent) -> rusqlite::Result<AppendOutcome> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM progress_events
                     WHERE patient_id = ?1 AND exercise_id = ?2 AND attempt_id = ?3"
                ),
                params![event.patient_id, event.exercise_id, event.attempt_id],
                event_from_row,
            )
            .optional()?;
        if let Some(existing) = existing {
            tx.commit()?;
            return Ok(AppendOutcome::Duplicate(existing));
        }

        let deviations =
            serde_json::to_string(&event.deviations).map_err(|e| conversion_error(8, e))?;
        tx.execute(
            "INSERT INTO progress_events
                (id, attempt_id, prescription_id, patient_id, exercise_id, step_index, recorded_at, success, deviations)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.id,
                event.attempt_id,
                event.prescription_id,
                event.patient_id,
                event.exercise_id,
                event.step_index,
                event.timestamp.to_rfc3339(),
                if event.success { 1 } else { 0 },
                deviations,
            ],
        )?;

        let (attempts, successes) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM progress_events
             WHERE patient_id = ?1 AND exercise_id = ?2",
            params![event.patient_id, event.exercise_id],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?)),
        )?;
        tx.commit()?;

        Ok(AppendOutcome::Appended {
            event: event.clone(),
            summary: AdherenceSummary { attempts, successes },
        })
    }
}

impl Store for Database {
    fn insert_exercise(&self, exercise: &Exercise) -> Result<()> {
        let body = serde_json::to_string(exercise)?;
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO exercises (id, symptom, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![exercise.id, exercise.symptom, body, exercise.created_at.to_rfc3339()],
        )?;
        if inserted == 0 {
            return Err(CoreError::DuplicateExercise(exercise.id.clone()));
        }
        Ok(())
    }

    fn replace_exercise(&self, exercise: &Exercise) -> Result<()> {
        let body = serde_json::to_string(exercise)?;
        let updated = self.conn()?.execute(
            "UPDATE exercises SET symptom = ?1, body = ?2 WHERE id = ?3",
            params![exercise.symptom, body, exercise.id],
        )?;
        if updated == 0 {
            return Err(CoreError::UnknownExercise(exercise.id.clone()));
        }
        Ok(())
    }

    fn remove_exercise(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM exercises WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(CoreError::UnknownExercise(id.to_string()));
        }
        Ok(())
    }

    fn exercise(&self, id: &str) -> Result<Option<Exercise>> {
        let body: Option<String> = self
            .conn()?
            .query_row("SELECT body FROM exercises WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        body.map(|b| exercise_from_body(&b)).transpose()
    }

    fn exercises(&self) -> Result<Vec<Exercise>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT body FROM exercises ORDER BY id")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        bodies.iter().map(|b| exercise_from_body(b)).collect()
    }

    fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO patients (id, name, birthdate) VALUES (?1, ?2, ?3)",
            params![patient.id, patient.name, patient.birthdate.format("%Y-%m-%d").to_string()],
        )?;
        if inserted == 0 {
            return Err(CoreError::DuplicatePatient(patient.id.clone()));
        }
        Ok(())
    }

    fn patient(&self, id: &str) -> Result<Option<Patient>> {
        let patient = self
            .conn()?
            .query_row(
                "SELECT id, name, birthdate FROM patients WHERE id = ?1",
                params![id],
                |row| {
                    let birthdate: String = row.get(2)?;
                    Ok(Patient {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        birthdate: NaiveDate::parse_from_str(&birthdate, "%Y-%m-%d")
                            .map_err(|e| conversion_error(2, e))?,
                    })
                },
            )
            .optional()?;
        Ok(patient)
    }

    fn insert_prescription(&self, prescription: &Prescription) -> Result<()> {
        let result = self.conn()?.execute(
            &format!(
                "INSERT INTO prescriptions ({PRESCRIPTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                prescription.id,
                prescription.patient_id,
                prescription.exercise_id,
                prescription.repetitions_target,
                prescription.daily_frequency,
                prescription.notes,
                prescription.issued_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(CoreError::DuplicatePrescription(prescription.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replace_prescription(&self, prescription: &Prescription) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE prescriptions SET repetitions_target = ?1, daily_frequency = ?2, notes = ?3
             WHERE id = ?4",
            params![
                prescription.repetitions_target,
                prescription.daily_frequency,
                prescription.notes,
                prescription.id,
            ],
        )?;
        if updated == 0 {
            return Err(CoreError::UnknownPrescription(prescription.id.clone()));
        }
        Ok(())
    }

    fn prescription(&self, id: &str) -> Result<Option<Prescription>> {
        let prescription = self
            .conn()?
            .query_row(
                &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1"),
                params![id],
                prescription_from_row,
            )
            .optional()?;
        Ok(prescription)
    }

    fn prescription_for(&self, patient_id: &str, exercise_id: &str) -> Result<Option<Prescription>> {
        let prescription = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
                     WHERE patient_id = ?1 AND exercise_id = ?2"
                ),
                params![patient_id, exercise_id],
                prescription_from_row,
            )
            .optional()?;
        Ok(prescription)
    }

    fn append_event(&self, event: ProgressEvent) -> Result<AppendOutcome> {
        // JSON has no encoding for NaN or infinity; such a row could never be read back.
        if let Some(record) = event
            .deviations
            .iter()
            .find(|r| !r.actual.is_finite() || !r.delta.is_finite())
        {
            return Err(CoreError::invalid_measurement(
                &record.metric,
                "non-finite value cannot be recorded",
            ));
        }

        let mut conn = self.conn()?;
        Self::append_in_transaction(&mut conn, &event).map_err(|e| match DatabaseError::from(e) {
            DatabaseError::Locked => CoreError::AppendConflict {
                patient_id: event.patient_id.clone(),
                exercise_id: event.exercise_id.clone(),
            },
            other => other.into(),
        })
    }

    fn events(&self, patient_id: &str, exercise_id: Option<&str>) -> Result<Vec<ProgressEvent>> {
        let conn = self.conn()?;
        let events = match exercise_id {
            Some(exercise_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM progress_events
                     WHERE patient_id = ?1 AND exercise_id = ?2 ORDER BY seq"
                ))?;
                let rows = stmt.query_map(params![patient_id, exercise_id], event_from_row)?;
                let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                events
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM progress_events
                     WHERE patient_id = ?1 ORDER BY seq"
                ))?;
                let rows = stmt.query_map(params![patient_id], event_from_row)?;
                let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                events
            }
        };
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExerciseStep;
    use crate::evaluator::evaluate;
    use crate::intake::MetricSample;
    use crate::threshold::Threshold;

    fn exercise() -> Exercise {
        Exercise::new("neck-rotation", "neck", "Neck rotation", "Turn slowly").with_step(
            ExerciseStep::new(0, "Left", "")
                .with_threshold(Threshold::gte("neck_rotation_left", 60.0, "deg", "Turn further left")),
        )
    }

    fn event(attempt_id: &str) -> ProgressEvent {
        let threshold = Threshold::gte("neck_rotation_left", 60.0, "deg", "Turn further left");
        let record = evaluate(&MetricSample::new("neck_rotation_left", 48.2, "deg"), Some(&threshold)).unwrap();
        ProgressEvent {
            id: uuid::Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            prescription_id: "rx-1".into(),
            patient_id: "p1".into(),
            exercise_id: "neck-rotation".into(),
            step_index: Some(0),
            timestamp: Utc::now(),
            success: false,
            deviations: vec![record],
        }
    }

    #[test]
    fn exercise_crud() {
        let db = Database::open_memory().unwrap();
        db.insert_exercise(&exercise()).unwrap();
        assert!(matches!(
            db.insert_exercise(&exercise()),
            Err(CoreError::DuplicateExercise(_))
        ));

        let loaded = db.exercise("neck-rotation").unwrap().unwrap();
        assert_eq!(loaded.steps[0].thresholds.len(), 1);

        let mut edited = exercise();
        edited.title = "Neck rotation (gentle)".into();
        db.replace_exercise(&edited).unwrap();
        assert_eq!(db.exercises().unwrap()[0].title, "Neck rotation (gentle)");

        db.remove_exercise("neck-rotation").unwrap();
        assert!(db.exercise("neck-rotation").unwrap().is_none());
        assert!(matches!(
            db.remove_exercise("neck-rotation"),
            Err(CoreError::UnknownExercise(_))
        ));
    }

    #[test]
    fn prescription_pair_is_unique() {
        let db = Database::open_memory().unwrap();
        db.insert_prescription(&Prescription::new("rx-1", "p1", "neck-rotation", 10))
            .unwrap();
        assert!(matches!(
            db.insert_prescription(&Prescription::new("rx-2", "p1", "neck-rotation", 5)),
            Err(CoreError::DuplicatePrescription(_))
        ));
        let found = db.prescription_for("p1", "neck-rotation").unwrap().unwrap();
        assert_eq!(found.id, "rx-1");
    }

    #[test]
    fn append_is_idempotent_per_attempt() {
        let db = Database::open_memory().unwrap();
        let first = db.append_event(event("a-1")).unwrap();
        assert!(matches!(
            first,
            AppendOutcome::Appended {
                summary: AdherenceSummary { attempts: 1, successes: 0 },
                ..
            }
        ));

        let retry = db.append_event(event("a-1")).unwrap();
        match retry {
            AppendOutcome::Duplicate(existing) => assert_eq!(existing.id, first.event().id),
            other => panic!("expected duplicate, got {other:?}"),
        }

        let events = db.events("p1", Some("neck-rotation")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].deviations[0].coaching_prompt.as_deref(), Some("Turn further left"));
    }

    #[test]
    fn non_finite_deviation_is_never_written() {
        let db = Database::open_memory().unwrap();
        db.append_event(event("a-1")).unwrap();

        let mut overflowed = event("a-2");
        overflowed.deviations[0].delta = f64::NEG_INFINITY;
        assert!(matches!(
            db.append_event(overflowed),
            Err(CoreError::InvalidMeasurement { .. })
        ));

        let events = db.events("p1", Some("neck-rotation")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attempt_id, "a-1");
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motionrx.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.insert_patient(&Patient {
                id: "p1".into(),
                name: "Kim".into(),
                birthdate: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
            })
            .unwrap();
            db.append_event(event("a-1")).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.patient("p1").unwrap().unwrap().name, "Kim");
        assert_eq!(db.events("p1", None).unwrap().len(), 1);
    }
}
