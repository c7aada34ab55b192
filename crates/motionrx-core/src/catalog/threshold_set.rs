use crate::threshold::Threshold;

use super::{Exercise, ExerciseStep};

/// Ordered thresholds for one scoring pass, looked up by exact metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn for_step(step: &ExerciseStep) -> Self {
        Self::new(step.thresholds.clone())
    }

    /// Every step's thresholds in step order; the first threshold for a metric wins.
    pub fn for_exercise(exercise: &Exercise) -> Self {
        let mut thresholds: Vec<Threshold> = Vec::new();
        for threshold in exercise.steps.iter().flat_map(|s| s.thresholds.iter()) {
            if !thresholds.iter().any(|t| t.metric == threshold.metric) {
                thresholds.push(threshold.clone());
            }
        }
        Self { thresholds }
    }

    /// No fuzzy matching and no unit conversion.
    pub fn get(&self, metric: &str) -> Option<&Threshold> {
        self.thresholds.iter().find(|t| t.metric == metric)
    }
}
