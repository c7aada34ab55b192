//! Coaching request command for CLI.
//!
//! Prints the request that would be handed to the coaching generator together
//! with the built-in feedback lines for the same attempt.

use clap::Args;
use motionrx_core::feedback_lines;

use super::{open_engine, print_json, CommandResult};

#[derive(Args)]
pub struct CoachArgs {
    /// Patient ID
    patient_id: String,
    /// Exercise ID
    exercise_id: String,
    /// Attempt to coach (default: most recent)
    #[arg(long)]
    attempt_id: Option<String>,
    /// Feedback language, e.g. en or ko (default: from config)
    #[arg(long)]
    language: Option<String>,
    /// Request spoken feedback
    #[arg(long, overrides_with = "no_audio")]
    audio: bool,
    /// Request text-only feedback
    #[arg(long)]
    no_audio: bool,
}

pub fn run(args: CoachArgs) -> CommandResult {
    let engine = open_engine()?;
    let events = engine.get_progress(&args.patient_id, Some(&args.exercise_id))?;

    let event = match &args.attempt_id {
        Some(attempt_id) => events.iter().find(|e| &e.attempt_id == attempt_id),
        None => events.last(),
    }
    .ok_or_else(|| {
        format!(
            "no recorded attempt for {}/{}",
            args.patient_id, args.exercise_id
        )
    })?;

    let audio = match (args.audio, args.no_audio) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    };
    let request = engine.coaching_request(event, args.language.as_deref(), audio);
    let feedback = feedback_lines(&request);

    print_json(&serde_json::json!({
        "request": request,
        "feedback": feedback,
    }))
}
