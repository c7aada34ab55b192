//! Request-scoped operations over a [`Store`].
//!
//! The engine holds no state of its own besides the outbox of [`Event`]s.
//! Events are pushed only after the store has committed the change they
//! describe; draining the outbox and calling the coaching generator happen
//! outside the scoring path, so neither can undo a recorded attempt.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::adherence::{AdherenceAnalyzer, AdherenceReport, AdherenceSummary};
use crate::attempt::{Attempt, ProgressEvent};
use crate::catalog::{Exercise, ThresholdSet};
use crate::coaching::CoachingRequest;
use crate::error::{CoreError, Result, ValidationError};
use crate::evaluator::{self, AttemptPreview};
use crate::events::Event;
use crate::intake::{AttemptSubmission, MetricSample};
use crate::prescription::{Patient, Prescription, PrescriptionUpdate};
use crate::storage::{AppendOutcome, CoachingConfig, Store};
use crate::threshold::Threshold;

pub struct Engine<S: Store> {
    store: S,
    coaching: CoachingConfig,
    outbox: Mutex<Vec<Event>>,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_coaching(store, CoachingConfig::default())
    }

    /// Engine whose coaching requests default to `coaching`'s language and audio flag.
    pub fn with_coaching(store: S, coaching: CoachingConfig) -> Self {
        Self {
            store,
            coaching,
            outbox: Mutex::new(Vec::new()),
        }
    }

    /// Queue an event for a change that is already committed.
    ///
    /// Never fails: a consumer that panicked while draining must not turn a
    /// recorded change into an error for the caller.
    fn publish(&self, event: Event) {
        let mut outbox = self.outbox.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("event outbox was poisoned by a panicked consumer; recovering");
            poisoned.into_inner()
        });
        outbox.push(event);
    }

    /// Take every queued event, oldest first.
    pub fn drain_events(&self) -> Vec<Event> {
        let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *outbox)
    }

    // ── Catalog ──────────────────────────────────────────────────────────

    pub fn register_exercise(&self, exercise: &Exercise) -> Result<()> {
        exercise.validate()?;
        self.store.insert_exercise(exercise)?;
        tracing::info!(exercise_id = %exercise.id, steps = exercise.steps.len(), "exercise registered");
        self.publish(Event::ExerciseRegistered {
            exercise_id: exercise.id.clone(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Replace an exercise wholesale. In-flight scoring keeps the version it read.
    pub fn update_exercise(&self, id: &str, exercise: &Exercise) -> Result<()> {
        if exercise.id != id {
            return Err(ValidationError::invalid(
                "id",
                format!("body id '{}' does not match '{id}'", exercise.id),
            )
            .into());
        }
        exercise.validate()?;
        self.store.replace_exercise(exercise)?;
        tracing::info!(exercise_id = %id, "exercise updated");
        self.publish(Event::ExerciseUpdated {
            exercise_id: id.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn delete_exercise(&self, id: &str) -> Result<()> {
        self.store.remove_exercise(id)?;
        tracing::info!(exercise_id = %id, "exercise deleted");
        self.publish(Event::ExerciseDeleted {
            exercise_id: id.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn get_exercise(&self, id: &str) -> Result<Exercise> {
        self.store
            .exercise(id)?
            .ok_or_else(|| CoreError::UnknownExercise(id.to_string()))
    }

    pub fn list_exercises(&self, symptom: Option<&str>) -> Result<Vec<Exercise>> {
        let mut exercises = self.store.exercises()?;
        if let Some(symptom) = symptom {
            exercises.retain(|ex| ex.symptom == symptom);
        }
        Ok(exercises)
    }

    /// Ordered thresholds of one step; empty when the step is ungraded.
    pub fn get_thresholds(&self, exercise_id: &str, step_index: u32) -> Result<Vec<Threshold>> {
        let exercise = self.get_exercise(exercise_id)?;
        let step = exercise.step(step_index).ok_or_else(|| CoreError::UnknownStep {
            exercise_id: exercise_id.to_string(),
            index: step_index,
        })?;
        Ok(step.thresholds.clone())
    }

    fn thresholds_for(&self, exercise: &Exercise, step_index: Option<u32>) -> Result<ThresholdSet> {
        match step_index {
            Some(index) => exercise
                .step(index)
                .map(ThresholdSet::for_step)
                .ok_or_else(|| CoreError::UnknownStep {
                    exercise_id: exercise.id.clone(),
                    index,
                }),
            None => Ok(ThresholdSet::for_exercise(exercise)),
        }
    }

    // ── Patients and prescriptions ───────────────────────────────────────

    pub fn register_patient(&self, patient: &Patient) -> Result<()> {
        patient.validate()?;
        self.store.insert_patient(patient)
    }

    pub fn get_patient(&self, id: &str) -> Result<Patient> {
        self.store
            .patient(id)?
            .ok_or_else(|| CoreError::UnknownPatient(id.to_string()))
    }

    /// Issue a prescription for an existing patient and exercise.
    pub fn prescribe(&self, prescription: &Prescription) -> Result<()> {
        prescription.validate()?;
        self.get_patient(&prescription.patient_id)?;
        self.get_exercise(&prescription.exercise_id)?;
        self.store.insert_prescription(prescription)?;
        tracing::info!(
            prescription_id = %prescription.id,
            patient_id = %prescription.patient_id,
            exercise_id = %prescription.exercise_id,
            repetitions_target = prescription.repetitions_target,
            "prescription issued"
        );
        self.publish(Event::PrescriptionIssued {
            prescription_id: prescription.id.clone(),
            exercise_id: prescription.exercise_id.clone(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Edit a prescription. Lowering the target to or below the successes
    /// already recorded announces [`Event::RepetitionTargetReached`].
    pub fn update_prescription(&self, id: &str, update: &PrescriptionUpdate) -> Result<Prescription> {
        let mut prescription = self.get_prescription(id)?;
        if update.is_empty() {
            return Ok(prescription);
        }
        let previous_target = prescription.repetitions_target;
        prescription.apply(update)?;
        self.store.replace_prescription(&prescription)?;
        self.publish(Event::PrescriptionUpdated {
            prescription_id: id.to_string(),
            at: Utc::now(),
        });

        if prescription.repetitions_target < previous_target {
            let events = self
                .store
                .events(&prescription.patient_id, Some(&prescription.exercise_id))?;
            let summary = AdherenceSummary::from_events(&events);
            if !summary.target_met(previous_target) && summary.target_met(prescription.repetitions_target) {
                self.publish(Event::RepetitionTargetReached {
                    prescription_id: prescription.id.clone(),
                    successes: summary.successes,
                    repetitions_target: prescription.repetitions_target,
                    at: Utc::now(),
                });
            }
        }
        Ok(prescription)
    }

    pub fn get_prescription(&self, id: &str) -> Result<Prescription> {
        self.store
            .prescription(id)?
            .ok_or_else(|| CoreError::UnknownPrescription(id.to_string()))
    }

    // ── Attempts ─────────────────────────────────────────────────────────

    /// Score an attempt and append it to its progress stream.
    ///
    /// Resubmitting an attempt id already in the stream returns the recorded
    /// event unchanged; the retry's own scores are discarded.
    ///
    /// # Errors
    /// - [`CoreError::UnknownPrescription`], [`CoreError::UnknownExercise`],
    ///   [`CoreError::UnknownStep`] for dangling references
    /// - [`CoreError::EmptyAttempt`] / [`CoreError::InvalidMeasurement`] for a
    ///   rejected batch; nothing is recorded
    /// - [`CoreError::AppendConflict`] when the stream is busy; retry with the
    ///   same attempt id
    pub fn submit_attempt(
        &self,
        prescription_id: &str,
        submission: AttemptSubmission,
    ) -> Result<ProgressEvent> {
        let prescription = self.get_prescription(prescription_id)?;
        let exercise = self.get_exercise(&prescription.exercise_id)?;
        let thresholds = self.thresholds_for(&exercise, submission.step_index)?;

        let mut attempt = Attempt::new(&prescription, submission);
        if let Err(e) = attempt.score(&thresholds) {
            tracing::warn!(
                prescription_id,
                attempt_id = %attempt.attempt_id(),
                error = %e,
                "attempt rejected"
            );
            return Err(e);
        }
        let event = attempt.into_event()?;

        match self.store.append_event(event)? {
            AppendOutcome::Appended { event, summary } => {
                tracing::info!(
                    prescription_id,
                    attempt_id = %event.attempt_id,
                    success = event.success,
                    attempts = summary.attempts,
                    successes = summary.successes,
                    "attempt recorded"
                );
                self.publish(Event::AttemptRecorded {
                    event_id: event.id.clone(),
                    prescription_id: prescription.id.clone(),
                    success: event.success,
                    coaching: CoachingRequest::for_event(
                        &event,
                        &self.coaching.language,
                        self.coaching.audio,
                    ),
                    at: Utc::now(),
                });
                if event.success && summary.successes == prescription.repetitions_target {
                    self.publish(Event::RepetitionTargetReached {
                        prescription_id: prescription.id.clone(),
                        successes: summary.successes,
                        repetitions_target: prescription.repetitions_target,
                        at: Utc::now(),
                    });
                }
                Ok(event)
            }
            AppendOutcome::Duplicate(existing) => {
                tracing::debug!(
                    prescription_id,
                    attempt_id = %existing.attempt_id,
                    "attempt already recorded"
                );
                Ok(existing)
            }
        }
    }

    /// Score samples against a step without recording anything.
    pub fn preview(
        &self,
        exercise_id: &str,
        step_index: u32,
        samples: &[MetricSample],
    ) -> Result<AttemptPreview> {
        let exercise = self.get_exercise(exercise_id)?;
        let thresholds = self.thresholds_for(&exercise, Some(step_index))?;
        let preview = evaluator::preview(samples, &thresholds)?;
        tracing::debug!(exercise_id, step_index, success = preview.success, "threshold preview");
        Ok(preview)
    }

    // ── Progress ─────────────────────────────────────────────────────────

    /// A stream may be queried while its exercise is in the catalog, or after
    /// deletion as long as the patient still holds a prescription for it.
    fn check_stream(&self, patient_id: &str, exercise_id: &str) -> Result<()> {
        if self.store.exercise(exercise_id)?.is_none()
            && self.store.prescription_for(patient_id, exercise_id)?.is_none()
        {
            return Err(CoreError::UnknownExercise(exercise_id.to_string()));
        }
        Ok(())
    }

    pub fn get_progress(&self, patient_id: &str, exercise_id: Option<&str>) -> Result<Vec<ProgressEvent>> {
        self.get_patient(patient_id)?;
        if let Some(exercise_id) = exercise_id {
            self.check_stream(patient_id, exercise_id)?;
        }
        self.store.events(patient_id, exercise_id)
    }

    /// Recomputed from the log on every call.
    pub fn get_adherence(&self, patient_id: &str, exercise_id: &str) -> Result<AdherenceSummary> {
        self.get_patient(patient_id)?;
        self.check_stream(patient_id, exercise_id)?;
        let events = self.store.events(patient_id, Some(exercise_id))?;
        Ok(AdherenceSummary::from_events(&events))
    }

    pub fn adherence_report(&self, patient_id: &str, exercise_id: &str) -> Result<AdherenceReport> {
        let prescription = self
            .store
            .prescription_for(patient_id, exercise_id)?
            .ok_or_else(|| CoreError::UnknownPrescription(format!("{patient_id}/{exercise_id}")))?;
        let events = self.store.events(patient_id, Some(exercise_id))?;
        Ok(AdherenceAnalyzer::new().analyze(&prescription, &events))
    }

    /// Coaching request for a recorded event, overriding the configured defaults.
    pub fn coaching_request(
        &self,
        event: &ProgressEvent,
        language: Option<&str>,
        audio: Option<bool>,
    ) -> CoachingRequest {
        CoachingRequest::for_event(
            event,
            language.unwrap_or(self.coaching.language.as_str()),
            audio.unwrap_or(self.coaching.audio),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExerciseStep;
    use crate::storage::MemoryStore;
    use chrono::NaiveDate;

    fn neck_rotation() -> Exercise {
        Exercise::new("neck-rotation", "neck", "Neck rotation", "Rotate the head slowly")
            .with_step(
                ExerciseStep::new(0, "Left", "Turn left")
                    .with_threshold(Threshold::gte("neck_rotation_left", 60.0, "deg", "Turn further left")),
            )
            .with_step(
                ExerciseStep::new(1, "Right", "Turn right")
                    .with_threshold(Threshold::gte("neck_rotation_right", 60.0, "deg", "Turn further right")),
            )
    }

    fn engine(target: u32) -> Engine<MemoryStore> {
        let engine = Engine::new(MemoryStore::new());
        engine.register_exercise(&neck_rotation()).unwrap();
        engine
            .register_patient(&Patient {
                id: "p1".into(),
                name: "Kim".into(),
                birthdate: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
            })
            .unwrap();
        engine
            .prescribe(&Prescription::new("rx-1", "p1", "neck-rotation", target))
            .unwrap();
        engine.drain_events();
        engine
    }

    fn left(value: f64) -> AttemptSubmission {
        AttemptSubmission::new(vec![MetricSample::new("neck_rotation_left", value, "deg")]).for_step(0)
    }

    #[test]
    fn submit_records_event_and_queues_coaching() {
        let engine = engine(10);
        let event = engine.submit_attempt("rx-1", left(48.2)).unwrap();
        assert!(!event.success);

        let events = engine.drain_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::AttemptRecorded { coaching, success, .. } => {
                assert!(!success);
                assert_eq!(coaching.patient_state.len(), 1);
                assert_eq!(coaching.patient_state[0].coaching_prompt, "Turn further left");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_step_is_rejected() {
        let engine = engine(10);
        let err = engine
            .submit_attempt("rx-1", left(70.0).for_step(9))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownStep { index: 9, .. }));
        assert!(engine.get_progress("p1", None).unwrap().is_empty());
    }

    #[test]
    fn rejected_batch_records_nothing() {
        let engine = engine(10);
        let err = engine
            .submit_attempt("rx-1", left(f64::NAN))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidMeasurement { .. }));
        assert_eq!(engine.get_adherence("p1", "neck-rotation").unwrap().attempts, 0);
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn target_reached_is_announced_once() {
        let engine = engine(2);
        for _ in 0..3 {
            engine.submit_attempt("rx-1", left(65.0)).unwrap();
        }
        let reached: Vec<_> = engine
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, Event::RepetitionTargetReached { .. }))
            .collect();
        assert_eq!(reached.len(), 1);
    }

    #[test]
    fn lowering_target_below_successes_announces_it() {
        let engine = engine(5);
        for _ in 0..3 {
            engine.submit_attempt("rx-1", left(65.0)).unwrap();
        }
        engine.drain_events();

        let update = PrescriptionUpdate {
            repetitions_target: Some(2),
            ..Default::default()
        };
        engine.update_prescription("rx-1", &update).unwrap();
        let events = engine.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::RepetitionTargetReached { successes: 3, repetitions_target: 2, .. }
        )));

        // already met, lowering further is not a new crossing
        let update = PrescriptionUpdate {
            repetitions_target: Some(1),
            ..Default::default()
        };
        engine.update_prescription("rx-1", &update).unwrap();
        assert!(!engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, Event::RepetitionTargetReached { .. })));
    }

    #[test]
    fn poisoned_outbox_does_not_fail_recorded_attempt() {
        let engine = engine(10);
        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _outbox = engine.outbox.lock().unwrap();
            panic!("consumer crashed while draining");
        }));
        assert!(crashed.is_err());
        assert!(engine.outbox.is_poisoned());

        let event = engine.submit_attempt("rx-1", left(65.0)).unwrap();
        assert_eq!(engine.get_progress("p1", None).unwrap()[0].id, event.id);
        assert_eq!(engine.drain_events().len(), 1);
    }

    #[test]
    fn update_exercise_requires_matching_id() {
        let engine = engine(10);
        let err = engine.update_exercise("other", &neck_rotation()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn prescribe_requires_known_patient_and_exercise() {
        let engine = engine(10);
        assert!(matches!(
            engine.prescribe(&Prescription::new("rx-2", "ghost", "neck-rotation", 5)),
            Err(CoreError::UnknownPatient(_))
        ));
        assert!(matches!(
            engine.prescribe(&Prescription::new("rx-3", "p1", "jaw-open", 5)),
            Err(CoreError::UnknownExercise(_))
        ));
    }

    #[test]
    fn coaching_request_overrides_defaults() {
        let engine = engine(10);
        let event = engine.submit_attempt("rx-1", left(70.0)).unwrap();
        let request = engine.coaching_request(&event, Some("ko"), Some(false));
        assert_eq!(request.language, "ko");
        assert!(!request.audio);
        assert!(request.all_targets_met);
    }
}
