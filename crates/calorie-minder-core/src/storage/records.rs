//! Record types for the four stored series.
//!
//! Each type implements [`SeriesRecord`], which tells the store which table it
//! lives in, which column orders it, and how to bind/read a row. The store is
//! generic over the trait, so every query is statically typed per series.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Row, Statement, ToSql};
use serde::{Deserialize, Serialize};

/// A record type persisted as one series in the measurement store.
pub trait SeriesRecord: Sized + Send + 'static {
    /// Ordering key; range predicates are expressed in this type.
    type Key: ToSql + Send + Sync;

    const TABLE: &'static str;
    /// Column the series is ordered by.
    const KEY_COLUMN: &'static str;
    /// Data columns in insert/select order.
    const COLUMNS: &'static [&'static str];

    /// Execute a prepared `INSERT` whose placeholders follow [`Self::COLUMNS`].
    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize>;

    /// Read a row selected with [`Self::COLUMNS`] in order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A body-weight reading accepted from the scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSample {
    /// Local wall-clock time, second precision.
    pub timestamp: NaiveDateTime,
    pub subject_id: String,
    pub value_grams: f64,
}

/// Calories from one committed meal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeEvent {
    /// Local wall-clock time the meal was committed.
    pub timestamp: NaiveDateTime,
    pub calorie_count: u32,
}

/// Calories expended over `[start_nanos, end_nanos)`.
///
/// Stored intervals never cross a local midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenditureInterval {
    pub start_nanos: i64,
    pub end_nanos: i64,
    pub calories: f64,
}

/// One row of the derived per-day table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub calories_in: i64,
    pub calories_out: i64,
    pub moving_avg_in: i64,
    pub moving_avg_out: i64,
}

impl SeriesRecord for WeightSample {
    type Key = NaiveDateTime;

    const TABLE: &'static str = "weight_samples";
    const KEY_COLUMN: &'static str = "recorded_at";
    const COLUMNS: &'static [&'static str] = &["recorded_at", "subject_id", "value_grams"];

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![self.timestamp, self.subject_id, self.value_grams])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            timestamp: row.get(0)?,
            subject_id: row.get(1)?,
            value_grams: row.get(2)?,
        })
    }
}

impl SeriesRecord for IntakeEvent {
    type Key = NaiveDateTime;

    const TABLE: &'static str = "intake_events";
    const KEY_COLUMN: &'static str = "recorded_at";
    const COLUMNS: &'static [&'static str] = &["recorded_at", "calorie_count"];

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![self.timestamp, self.calorie_count])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            timestamp: row.get(0)?,
            calorie_count: row.get(1)?,
        })
    }
}

impl SeriesRecord for ExpenditureInterval {
    // Ordered by end so "most recent" is the interval that reaches furthest.
    type Key = i64;

    const TABLE: &'static str = "expenditure_intervals";
    const KEY_COLUMN: &'static str = "end_ns";
    const COLUMNS: &'static [&'static str] = &["start_ns", "end_ns", "calories"];

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![self.start_nanos, self.end_nanos, self.calories])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            start_nanos: row.get(0)?,
            end_nanos: row.get(1)?,
            calories: row.get(2)?,
        })
    }
}

impl SeriesRecord for DailyAggregate {
    type Key = NaiveDate;

    const TABLE: &'static str = "daily_aggregates";
    const KEY_COLUMN: &'static str = "date";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "calories_in",
        "calories_out",
        "moving_avg_in",
        "moving_avg_out",
    ];

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.date,
            self.calories_in,
            self.calories_out,
            self.moving_avg_in,
            self.moving_avg_out,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            calories_in: row.get(1)?,
            calories_out: row.get(2)?,
            moving_avg_in: row.get(3)?,
            moving_avg_out: row.get(4)?,
        })
    }
}
