use clap::Subcommand;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// List recorded attempts in submission order
    List {
        /// Patient ID
        patient_id: String,
        /// Limit to one exercise
        #[arg(long)]
        exercise: Option<String>,
    },
    /// Adherence report for one prescribed exercise
    Adherence {
        /// Patient ID
        patient_id: String,
        /// Exercise ID
        exercise_id: String,
    },
}

pub fn run(action: ProgressAction) -> CommandResult {
    let engine = open_engine()?;
    match action {
        ProgressAction::List { patient_id, exercise } => {
            print_json(&engine.get_progress(&patient_id, exercise.as_deref())?)?;
        }
        ProgressAction::Adherence {
            patient_id,
            exercise_id,
        } => {
            print_json(&engine.adherence_report(&patient_id, &exercise_id)?)?;
        }
    }
    Ok(())
}
