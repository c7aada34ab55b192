//! Exercise catalog commands for CLI.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use motionrx_core::Exercise;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum ExerciseAction {
    /// Register an exercise from a JSON file
    Add {
        /// Path to the exercise JSON
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace an exercise from a JSON file
    Update {
        /// Exercise ID
        id: String,
        /// Path to the exercise JSON
        #[arg(long)]
        file: PathBuf,
    },
    /// List exercises
    List {
        /// Filter by symptom category
        #[arg(long)]
        symptom: Option<String>,
    },
    /// Show one exercise
    Show {
        /// Exercise ID
        id: String,
    },
    /// Show the thresholds of one step
    Thresholds {
        /// Exercise ID
        id: String,
        /// Step index
        step: u32,
    },
    /// Delete an exercise
    Delete {
        /// Exercise ID
        id: String,
    },
}

fn read_exercise(file: &Path) -> Result<Exercise, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn run(action: ExerciseAction) -> CommandResult {
    let engine = open_engine()?;
    match action {
        ExerciseAction::Add { file } => {
            let exercise = read_exercise(&file)?;
            engine.register_exercise(&exercise)?;
            print_json(&exercise)?;
        }
        ExerciseAction::Update { id, file } => {
            let exercise = read_exercise(&file)?;
            engine.update_exercise(&id, &exercise)?;
            print_json(&exercise)?;
        }
        ExerciseAction::List { symptom } => {
            let exercises = engine.list_exercises(symptom.as_deref())?;
            print_json(&exercises)?;
        }
        ExerciseAction::Show { id } => {
            print_json(&engine.get_exercise(&id)?)?;
        }
        ExerciseAction::Thresholds { id, step } => {
            print_json(&engine.get_thresholds(&id, step)?)?;
        }
        ExerciseAction::Delete { id } => {
            engine.delete_exercise(&id)?;
            println!("exercise deleted: {id}");
        }
    }
    Ok(())
}
