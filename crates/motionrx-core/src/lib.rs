//! # motionrx Core Library
//!
//! Scores patient exercise attempts against clinician-authored thresholds and
//! tracks adherence to prescribed repetition targets. Front ends (the CLI, a
//! patient app backend) are thin layers over [`Engine`].
//!
//! ## Architecture
//!
//! - **Catalog**: exercises made of ordered steps, each carrying zero or more
//!   [`Threshold`]s
//! - **Intake / Evaluator**: validates a measurement batch and turns each
//!   sample into a [`DeviationRecord`]
//! - **Attempt**: the `Pending -> Scored` state machine producing an
//!   immutable [`ProgressEvent`]
//! - **Adherence**: counts recomputed from the progress log
//! - **Coaching**: payloads for the external language and TTS services
//! - **Storage**: in-memory and SQLite stores, TOML configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: every externally exposed operation
//! - [`Store`]: catalog and progress log repository
//! - [`Config`]: application configuration management

pub mod adherence;
pub mod attempt;
pub mod catalog;
pub mod coaching;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod intake;
pub mod prescription;
pub mod storage;
pub mod threshold;

pub use adherence::{AdherenceAnalyzer, AdherenceReport, AdherenceSummary, DailyAdherence};
pub use attempt::{Attempt, AttemptOutcome, AttemptState, ProgressEvent, StreamKey};
pub use catalog::{AvatarStyle, Exercise, ExerciseStep, ThresholdSet};
pub use coaching::{feedback_lines, CoachingEntry, CoachingRequest, FeedbackLine};
pub use engine::Engine;
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use evaluator::{AttemptPreview, DeviationRecord, Target};
pub use events::Event;
pub use intake::{AttemptSubmission, MetricSample};
pub use prescription::{Patient, Prescription, PrescriptionUpdate};
pub use storage::{AppendOutcome, Config, Database, MemoryStore, Store};
pub use threshold::{Comparator, Threshold};
