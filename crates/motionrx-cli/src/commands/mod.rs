pub mod attempt;
pub mod coach;
pub mod config;
pub mod exercise;
pub mod patient;
pub mod prescription;
pub mod progress;

use motionrx_core::{Config, Database, Engine, MetricSample};
use serde::Serialize;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Engine over the configured SQLite database, with the configured coaching defaults.
pub fn open_engine() -> Result<Engine<Database>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open(&config.storage.database_file)?;
    Ok(Engine::with_coaching(db, config.coaching))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CommandResult {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Parse `metric=value[:unit]`.
pub fn parse_sample(raw: &str) -> Result<MetricSample, String> {
    let (metric, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid sample '{raw}', expected metric=value[:unit]"))?;
    let (value, unit) = rest.split_once(':').unwrap_or((rest, ""));
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value in sample '{raw}': {e}"))?;
    Ok(MetricSample::new(metric.trim(), value, unit.trim()))
}
