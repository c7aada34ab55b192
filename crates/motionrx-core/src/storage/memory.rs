//! In-process store.
//!
//! Catalog entries are held as `Arc` snapshots behind an `RwLock`: readers
//! clone the `Arc` and never see a half-applied edit. Each progress stream has
//! its own `Mutex`, giving a single writer per (patient, exercise) key while
//! unrelated streams append in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::adherence::AdherenceSummary;
use crate::attempt::{ProgressEvent, StreamKey};
use crate::catalog::Exercise;
use crate::error::{CoreError, DatabaseError, Result};
use crate::prescription::{Patient, Prescription};

use super::{AppendOutcome, Store};

fn poisoned<T>(_: PoisonError<T>) -> CoreError {
    DatabaseError::Poisoned.into()
}

#[derive(Debug, Default)]
struct Stream {
    /// (global sequence, event) in append order
    events: Vec<(u64, ProgressEvent)>,
    by_attempt: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    exercises: RwLock<HashMap<String, Arc<Exercise>>>,
    patients: RwLock<HashMap<String, Patient>>,
    prescriptions: RwLock<HashMap<String, Prescription>>,
    streams: Mutex<HashMap<StreamKey, Arc<Mutex<Stream>>>>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, key: StreamKey) -> Result<Arc<Mutex<Stream>>> {
        let mut streams = self.streams.lock().map_err(poisoned)?;
        Ok(Arc::clone(streams.entry(key).or_default()))
    }

    fn streams_for(&self, patient_id: &str, exercise_id: Option<&str>) -> Result<Vec<Arc<Mutex<Stream>>>> {
        let streams = self.streams.lock().map_err(poisoned)?;
        Ok(streams
            .iter()
            .filter(|(key, _)| {
                key.patient_id == patient_id && exercise_id.map_or(true, |id| key.exercise_id == id)
            })
            .map(|(_, stream)| Arc::clone(stream))
            .collect())
    }
}

impl Store for MemoryStore {
    fn insert_exercise(&self, exercise: &Exercise) -> Result<()> {
        let mut exercises = self.exercises.write().map_err(poisoned)?;
        if exercises.contains_key(&exercise.id) {
            return Err(CoreError::DuplicateExercise(exercise.id.clone()));
        }
        exercises.insert(exercise.id.clone(), Arc::new(exercise.clone()));
        Ok(())
    }

    fn replace_exercise(&self, exercise: &Exercise) -> Result<()> {
        let mut exercises = self.exercises.write().map_err(poisoned)?;
        match exercises.get_mut(&exercise.id) {
            Some(slot) => {
                *slot = Arc::new(exercise.clone());
                Ok(())
            }
            None => Err(CoreError::UnknownExercise(exercise.id.clone())),
        }
    }

    fn remove_exercise(&self, id: &str) -> Result<()> {
        let mut exercises = self.exercises.write().map_err(poisoned)?;
        exercises
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::UnknownExercise(id.to_string()))
    }

    fn exercise(&self, id: &str) -> Result<Option<Exercise>> {
        let snapshot = self.exercises.read().map_err(poisoned)?.get(id).cloned();
        Ok(snapshot.map(|ex| (*ex).clone()))
    }

    fn exercises(&self) -> Result<Vec<Exercise>> {
        let snapshots: Vec<Arc<Exercise>> =
            self.exercises.read().map_err(poisoned)?.values().cloned().collect();
        let mut items: Vec<Exercise> = snapshots.iter().map(|ex| (**ex).clone()).collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let mut patients = self.patients.write().map_err(poisoned)?;
        if patients.contains_key(&patient.id) {
            return Err(CoreError::DuplicatePatient(patient.id.clone()));
        }
        patients.insert(patient.id.clone(), patient.clone());
        Ok(())
    }

    fn patient(&self, id: &str) -> Result<Option<Patient>> {
        Ok(self.patients.read().map_err(poisoned)?.get(id).cloned())
    }

    fn insert_prescription(&self, prescription: &Prescription) -> Result<()> {
        let mut prescriptions = self.prescriptions.write().map_err(poisoned)?;
        let pair_taken = prescriptions.values().any(|p| {
            p.patient_id == prescription.patient_id && p.exercise_id == prescription.exercise_id
        });
        if prescriptions.contains_key(&prescription.id) || pair_taken {
            return Err(CoreError::DuplicatePrescription(prescription.id.clone()));
        }
        prescriptions.insert(prescription.id.clone(), prescription.clone());
        Ok(())
    }

    fn replace_prescription(&self, prescription: &Prescription) -> Result<()> {
        let mut prescriptions = self.prescriptions.write().map_err(poisoned)?;
        match prescriptions.get_mut(&prescription.id) {
            Some(slot) => {
                *slot = prescription.clone();
                Ok(())
            }
            None => Err(CoreError::UnknownPrescription(prescription.id.clone())),
        }
    }

    fn prescription(&self, id: &str) -> Result<Option<Prescription>> {
        Ok(self.prescriptions.read().map_err(poisoned)?.get(id).cloned())
    }

    fn prescription_for(&self, patient_id: &str, exercise_id: &str) -> Result<Option<Prescription>> {
        let prescriptions = self.prescriptions.read().map_err(poisoned)?;
        Ok(prescriptions
            .values()
            .find(|p| p.patient_id == patient_id && p.exercise_id == exercise_id)
            .cloned())
    }

    fn append_event(&self, event: ProgressEvent) -> Result<AppendOutcome> {
        let stream = self.stream(event.stream_key())?;
        let mut stream = stream.lock().map_err(poisoned)?;

        if let Some(&position) = stream.by_attempt.get(&event.attempt_id) {
            return Ok(AppendOutcome::Duplicate(stream.events[position].1.clone()));
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let position = stream.events.len();
        stream.by_attempt.insert(event.attempt_id.clone(), position);
        stream.events.push((seq, event.clone()));

        let summary = AdherenceSummary::from_events(stream.events.iter().map(|(_, e)| e));
        Ok(AppendOutcome::Appended { event, summary })
    }

    fn events(&self, patient_id: &str, exercise_id: Option<&str>) -> Result<Vec<ProgressEvent>> {
        let mut collected: Vec<(u64, ProgressEvent)> = Vec::new();
        for stream in self.streams_for(patient_id, exercise_id)? {
            let stream = stream.lock().map_err(poisoned)?;
            collected.extend(stream.events.iter().cloned());
        }
        collected.sort_by_key(|(seq, _)| *seq);
        Ok(collected.into_iter().map(|(_, event)| event).collect())
    }
}
