//! Prescription commands for CLI.

use clap::Subcommand;
use motionrx_core::{Prescription, PrescriptionUpdate};
use uuid::Uuid;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum PrescriptionAction {
    /// Prescribe an exercise to a patient
    Create {
        /// Patient ID
        patient_id: String,
        /// Exercise ID
        exercise_id: String,
        /// Successful attempts required
        #[arg(long)]
        target: u32,
        /// Successful attempts expected per day (default: 1)
        #[arg(long, default_value = "1")]
        daily_frequency: u32,
        /// Clinician notes
        #[arg(long)]
        notes: Option<String>,
        /// Prescription ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Edit a prescription
    Update {
        /// Prescription ID
        id: String,
        /// New repetition target
        #[arg(long)]
        target: Option<u32>,
        /// New daily frequency
        #[arg(long)]
        daily_frequency: Option<u32>,
        /// New notes (empty string clears them)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show one prescription
    Show {
        /// Prescription ID
        id: String,
    },
}

pub fn run(action: PrescriptionAction) -> CommandResult {
    let engine = open_engine()?;
    match action {
        PrescriptionAction::Create {
            patient_id,
            exercise_id,
            target,
            daily_frequency,
            notes,
            id,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let mut prescription = Prescription::new(&id, &patient_id, &exercise_id, target);
            prescription.daily_frequency = daily_frequency;
            prescription.notes = notes.filter(|n| !n.is_empty());
            engine.prescribe(&prescription)?;
            print_json(&prescription)?;
        }
        PrescriptionAction::Update {
            id,
            target,
            daily_frequency,
            notes,
        } => {
            let update = PrescriptionUpdate {
                repetitions_target: target,
                daily_frequency,
                notes,
            };
            print_json(&engine.update_prescription(&id, &update)?)?;
        }
        PrescriptionAction::Show { id } => {
            print_json(&engine.get_prescription(&id)?)?;
        }
    }
    Ok(())
}
