//! Database schema migrations for motionrx.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| row.get::<_, i32>(0))
        .unwrap_or_else(|e| {
            if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                tracing::warn!(error = %e, "failed to read schema_version");
            }
            0
        })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// v1: catalog, patients, prescriptions, and the progress log.
///
/// Exercises are stored whole as JSON so a read always sees a complete
/// exercise with its steps and thresholds.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS exercises (
            id          TEXT PRIMARY KEY,
            symptom     TEXT NOT NULL,
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS patients (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            birthdate   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS prescriptions (
            id                  TEXT PRIMARY KEY,
            patient_id          TEXT NOT NULL,
            exercise_id         TEXT NOT NULL,
            repetitions_target  INTEGER NOT NULL,
            daily_frequency     INTEGER NOT NULL DEFAULT 1,
            notes               TEXT,
            issued_at           TEXT NOT NULL,
            UNIQUE (patient_id, exercise_id)
        );

        CREATE TABLE IF NOT EXISTS progress_events (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            attempt_id      TEXT NOT NULL,
            prescription_id TEXT NOT NULL,
            patient_id      TEXT NOT NULL,
            exercise_id     TEXT NOT NULL,
            step_index      INTEGER,
            recorded_at     TEXT NOT NULL,
            success         INTEGER NOT NULL,
            deviations      TEXT NOT NULL DEFAULT '[]',
            UNIQUE (patient_id, exercise_id, attempt_id)
        );",
    )?;
    set_schema_version(conn, 1)
}

/// v2: indexes for progress and catalog queries.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_progress_stream ON progress_events(patient_id, exercise_id, seq);
         CREATE INDEX IF NOT EXISTS idx_progress_patient ON progress_events(patient_id, seq);
         CREATE INDEX IF NOT EXISTS idx_exercises_symptom ON exercises(symptom);",
    )?;
    set_schema_version(conn, 2)
}
