//! Adherence tracking and analytics
//!
//! Adherence is always recomputed from the progress event log and never
//! stored as separately mutated counters. Every aggregate here is a
//! commutative fold, so the order events are read in does not matter.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::attempt::ProgressEvent;
use crate::prescription::Prescription;

/// Attempt and success counts for one (patient, exercise) stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdherenceSummary {
    /// Number of recorded attempts
    pub attempts: u32,
    /// Attempts where every measured metric passed
    pub successes: u32,
}

impl AdherenceSummary {
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a ProgressEvent>,
    {
        events.into_iter().fold(Self::default(), |mut acc, event| {
            acc.record(event.success);
            acc
        })
    }

    pub fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
    }

    /// `successes >= repetitions_target`
    pub fn target_met(&self, repetitions_target: u32) -> bool {
        self.successes >= repetitions_target
    }

    /// Ratio of successful attempts (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// One UTC day of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAdherence {
    pub date: NaiveDate,
    pub attempts: u32,
    pub successes: u32,
    /// Whether the day's successes reached the prescribed daily frequency
    pub cadence_met: bool,
}

/// Complete adherence report for one prescription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceReport {
    pub prescription_id: String,
    pub patient_id: String,
    pub exercise_id: String,
    pub summary: AdherenceSummary,
    pub repetitions_target: u32,
    pub target_met: bool,
    /// Ratio of successful attempts (0.0 to 1.0)
    pub success_rate: f64,
    /// Successes still needed to meet the target
    pub remaining: u32,
    /// Per-day breakdown, oldest first
    pub daily: Vec<DailyAdherence>,
}

/// Builds adherence reports from progress events
#[derive(Debug, Clone, Default)]
pub struct AdherenceAnalyzer;

impl AdherenceAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a stream's events against its prescription.
    ///
    /// Events belonging to other streams are ignored.
    pub fn analyze<'a, I>(&self, prescription: &Prescription, events: I) -> AdherenceReport
    where
        I: IntoIterator<Item = &'a ProgressEvent>,
    {
        let mut summary = AdherenceSummary::default();
        let mut by_day: BTreeMap<NaiveDate, AdherenceSummary> = BTreeMap::new();

        let in_stream = events.into_iter().filter(|e| {
            e.patient_id == prescription.patient_id && e.exercise_id == prescription.exercise_id
        });
        for event in in_stream {
            summary.record(event.success);
            by_day
                .entry(event.timestamp.date_naive())
                .or_default()
                .record(event.success);
        }

        let daily = by_day
            .into_iter()
            .map(|(date, day)| DailyAdherence {
                date,
                attempts: day.attempts,
                successes: day.successes,
                cadence_met: day.successes >= prescription.daily_frequency,
            })
            .collect();

        AdherenceReport {
            prescription_id: prescription.id.clone(),
            patient_id: prescription.patient_id.clone(),
            exercise_id: prescription.exercise_id.clone(),
            summary,
            repetitions_target: prescription.repetitions_target,
            target_met: summary.target_met(prescription.repetitions_target),
            success_rate: summary.success_rate(),
            remaining: prescription.repetitions_target.saturating_sub(summary.successes),
            daily,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn event(success: bool, at: DateTime<Utc>) -> ProgressEvent {
        ProgressEvent {
            id: uuid::Uuid::new_v4().to_string(),
            attempt_id: uuid::Uuid::new_v4().to_string(),
            prescription_id: "rx-1".into(),
            patient_id: "p1".into(),
            exercise_id: "neck-rotation".into(),
            step_index: None,
            timestamp: at,
            success,
            deviations: Vec::new(),
        }
    }

    fn base() -> DateTime<Utc> {
        "2026-03-02T09:00:00Z".parse().unwrap()
    }

    #[test]
    fn seven_of_nine_against_target_ten() {
        let events: Vec<ProgressEvent> = (0..9)
            .map(|i| event(i < 7, base() + Duration::minutes(i)))
            .collect();
        let summary = AdherenceSummary::from_events(&events);
        assert_eq!(summary, AdherenceSummary { attempts: 9, successes: 7 });
        assert!(!summary.target_met(10));

        let rx = Prescription::new("rx-1", "p1", "neck-rotation", 10);
        let report = AdherenceAnalyzer::new().analyze(&rx, &events);
        assert!(!report.target_met);
        assert_eq!(report.remaining, 3);
        assert!((report.success_rate - 7.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn empty_log_has_zero_rate() {
        let events: Vec<ProgressEvent> = Vec::new();
        let summary = AdherenceSummary::from_events(&events);
        assert_eq!(summary.attempts, 0);
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn daily_breakdown_checks_cadence() {
        let mut rx = Prescription::new("rx-1", "p1", "neck-rotation", 10);
        rx.daily_frequency = 2;

        let events = vec![
            event(true, base()),
            event(true, base() + Duration::hours(3)),
            event(true, base() + Duration::days(1)),
            event(false, base() + Duration::days(1) + Duration::hours(1)),
        ];
        let report = AdherenceAnalyzer::new().analyze(&rx, &events);

        assert_eq!(report.daily.len(), 2);
        assert_eq!(report.daily[0].successes, 2);
        assert!(report.daily[0].cadence_met);
        assert_eq!(report.daily[1].attempts, 2);
        assert!(!report.daily[1].cadence_met);
    }

    #[test]
    fn ignores_events_from_other_streams() {
        let rx = Prescription::new("rx-1", "p1", "neck-rotation", 1);
        let mut other = event(true, base());
        other.exercise_id = "jaw-open".into();
        let report = AdherenceAnalyzer::new().analyze(&rx, &[other]);
        assert_eq!(report.summary.attempts, 0);
        assert!(!report.target_met);
    }
}
