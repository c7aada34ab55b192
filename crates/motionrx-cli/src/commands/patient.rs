use chrono::NaiveDate;
use clap::Subcommand;
use motionrx_core::Patient;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum PatientAction {
    /// Register a patient
    Add {
        /// Patient ID
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Birthdate (YYYY-MM-DD)
        #[arg(long)]
        birthdate: NaiveDate,
    },
    /// Show one patient
    Show {
        /// Patient ID
        id: String,
    },
}

pub fn run(action: PatientAction) -> CommandResult {
    let engine = open_engine()?;
    match action {
        PatientAction::Add { id, name, birthdate } => {
            let patient = Patient { id, name, birthdate };
            engine.register_patient(&patient)?;
            print_json(&patient)?;
        }
        PatientAction::Show { id } => {
            print_json(&engine.get_patient(&id)?)?;
        }
    }
    Ok(())
}
