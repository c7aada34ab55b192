use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coaching::CoachingRequest;

/// Every committed state change in the engine produces an Event.
///
/// Events are queued only after the store has committed the change, so a
/// failing downstream consumer (coaching generation, TTS) can never roll
/// back or invalidate recorded progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ExerciseRegistered {
        exercise_id: String,
        at: DateTime<Utc>,
    },
    ExerciseUpdated {
        exercise_id: String,
        at: DateTime<Utc>,
    },
    ExerciseDeleted {
        exercise_id: String,
        at: DateTime<Utc>,
    },
    PrescriptionIssued {
        prescription_id: String,
        exercise_id: String,
        at: DateTime<Utc>,
    },
    PrescriptionUpdated {
        prescription_id: String,
        at: DateTime<Utc>,
    },
    /// A scored attempt was appended; `coaching` is ready for the generator.
    AttemptRecorded {
        event_id: String,
        prescription_id: String,
        success: bool,
        coaching: CoachingRequest,
        at: DateTime<Utc>,
    },
    /// Emitted once per crossing: by the append that brings successes up to
    /// the target, or by the edit that lowers the target to or below the
    /// successes already recorded.
    RepetitionTargetReached {
        prescription_id: String,
        successes: u32,
        repetitions_target: u32,
        at: DateTime<Utc>,
    },
}
