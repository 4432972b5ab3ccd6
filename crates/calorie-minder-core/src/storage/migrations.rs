//! Database schema migrations for the measurement store.
//!
//! Migrations are versioned and applied automatically when opening the store.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
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
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: the three raw series.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS weight_samples (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at  TEXT NOT NULL,
            subject_id   TEXT NOT NULL,
            value_grams  REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS intake_events (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at    TEXT NOT NULL,
            calorie_count  INTEGER NOT NULL CHECK (calorie_count >= 0)
        );

        CREATE TABLE IF NOT EXISTS expenditure_intervals (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            start_ns  INTEGER NOT NULL,
            end_ns    INTEGER NOT NULL,
            calories  REAL NOT NULL,
            CHECK (start_ns < end_ns)
        );

        CREATE INDEX IF NOT EXISTS idx_weight_samples_recorded_at ON weight_samples(recorded_at);
        CREATE INDEX IF NOT EXISTS idx_intake_events_recorded_at ON intake_events(recorded_at);
        CREATE INDEX IF NOT EXISTS idx_expenditure_intervals_end_ns ON expenditure_intervals(end_ns);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: the derived daily aggregate table.
///
/// Rows are rebuilt wholesale by the aggregator, so `date` is the only key.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS daily_aggregates (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            date            TEXT NOT NULL UNIQUE,
            calories_in     INTEGER NOT NULL,
            calories_out    INTEGER NOT NULL,
            moving_avg_in   INTEGER NOT NULL,
            moving_avg_out  INTEGER NOT NULL
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
