//! Exercise catalog: clinician-authored exercises, their ordered steps, and
//! the threshold sets used to grade each step.

mod exercise;
mod threshold_set;

pub use exercise::{AvatarStyle, Exercise, ExerciseStep};
pub use threshold_set::ThresholdSet;
