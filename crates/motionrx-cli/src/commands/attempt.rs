//! Attempt commands for CLI.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use motionrx_core::{AttemptSubmission, MetricSample};

use super::{open_engine, parse_sample, print_json, CommandResult};

#[derive(Subcommand)]
pub enum AttemptAction {
    /// Score and record an attempt
    Submit {
        /// Prescription ID
        prescription_id: String,
        /// Measured sample as metric=value[:unit], repeatable
        #[arg(long = "sample", value_parser = parse_sample, required = true)]
        samples: Vec<MetricSample>,
        /// Idempotency key; resubmitting the same ID records nothing new
        #[arg(long)]
        attempt_id: Option<String>,
        /// Grade against one step instead of the whole exercise
        #[arg(long)]
        step: Option<u32>,
        /// Capture time (RFC 3339)
        #[arg(long)]
        captured_at: Option<DateTime<Utc>>,
    },
    /// Score samples against a step without recording anything
    Preview {
        /// Exercise ID
        exercise_id: String,
        /// Step index
        step: u32,
        /// Suggested sample as metric=value[:unit], repeatable
        #[arg(long = "sample", value_parser = parse_sample, required = true)]
        samples: Vec<MetricSample>,
    },
}

pub fn run(action: AttemptAction) -> CommandResult {
    let engine = open_engine()?;
    match action {
        AttemptAction::Submit {
            prescription_id,
            samples,
            attempt_id,
            step,
            captured_at,
        } => {
            let mut submission = AttemptSubmission::new(samples);
            if let Some(attempt_id) = attempt_id {
                submission = submission.with_attempt_id(&attempt_id);
            }
            if let Some(step) = step {
                submission = submission.for_step(step);
            }
            submission.captured_at = captured_at;

            let event = engine.submit_attempt(&prescription_id, submission)?;
            print_json(&event)?;
        }
        AttemptAction::Preview {
            exercise_id,
            step,
            samples,
        } => {
            print_json(&engine.preview(&exercise_id, step, &samples)?)?;
        }
    }
    Ok(())
}
