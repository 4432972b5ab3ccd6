//! SQLite-backed measurement store.
//!
//! Holds the three raw series (weight samples, intake events, expenditure
//! intervals) and the derived daily aggregate. The store has no domain logic:
//! it appends, returns records ordered by their series key, and replaces or
//! removes ranges inside transactions.
//!
//! All access goes through one connection guarded by a mutex, so a
//! `replace_all` is never interleaved with a reader on the same series: a
//! reader sees the table either before or after the replacement.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, ToSql, Transaction};
use serde::{Deserialize, Serialize};

use super::data_dir;
use super::migrations::migrate;
use super::records::{IntakeEvent, SeriesRecord, WeightSample};
use crate::error::StoreError;

/// Half-open predicate on a series key: `from <= key < until`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRange<K> {
    pub from: Option<K>,
    pub until: Option<K>,
}

impl<K> SeriesRange<K> {
    pub fn all() -> Self {
        Self {
            from: None,
            until: None,
        }
    }

    pub fn between(from: K, until: K) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
        }
    }

    pub fn from(from: K) -> Self {
        Self {
            from: Some(from),
            until: None,
        }
    }
}

impl<K: ToSql> SeriesRange<K> {
    fn where_clause(&self, column: &str) -> (String, Vec<&dyn ToSql>) {
        let mut conditions = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();
        if let Some(from) = &self.from {
            conditions.push(format!("{column} >= ?"));
            values.push(from);
        }
        if let Some(until) = &self.until {
            conditions.push(format!("{column} < ?"));
            values.push(until);
        }
        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

/// Cheap change marker for a series.
///
/// Records are immutable, so any insert raises `last_id` and any delete
/// lowers `rows`; an unchanged watermark means an unchanged series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub rows: u64,
    pub last_id: i64,
}

/// A weight sample together with its row id, for user-driven deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWeightSample {
    pub id: i64,
    #[serde(flatten)]
    pub sample: WeightSample,
}

/// Durable store for all series.
pub struct MeasurementStore {
    conn: Mutex<Connection>,
}

impl MeasurementStore {
    /// Open the store at `<data dir>/calorie-minder.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened or migrated.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open(dir.join("calorie-minder.db"))
    }

    /// Open (creating if needed) the store at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        }) {
            Ok(mode) => tracing::debug!("journal mode: {mode}"),
            Err(err) => tracing::warn!("failed to enable WAL mode: {err}"),
        }
        // FULL keeps a commit on disk before the call returns.
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::from_connection(conn, Some(&path))
    }

    /// Open an in-memory store (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<&Path>) -> Result<Self, StoreError> {
        migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        if let Some(p) = path {
            tracing::info!("measurement store opened at {}", p.display());
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `f` against the store on tokio's blocking pool.
    ///
    /// Long-running loops go through this so a slow commit or a full rebuild
    /// never holds up a runtime worker thread.
    ///
    /// # Errors
    /// Whatever `f` returns, or `QueryFailed` if the blocking task panicked.
    pub async fn blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&MeasurementStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|err| StoreError::QueryFailed(format!("store task failed: {err}")))?
    }

    /// Reject every write with `SQLITE_READONLY` until switched back.
    #[cfg(test)]
    pub(crate) fn set_read_only(&self, read_only: bool) {
        let value = if read_only { "ON" } else { "OFF" };
        self.lock()
            .pragma_update(None, "query_only", value)
            .expect("toggle query_only");
    }

    /// Append one record.
    pub fn append<R: SeriesRecord>(&self, record: &R) -> Result<i64, StoreError> {
        let conn = self.lock();
        insert_all(&conn, std::slice::from_ref(record))?;
        Ok(conn.last_insert_rowid())
    }

    /// Append a batch of records in one transaction; all or nothing.
    pub fn append_batch<R: SeriesRecord>(&self, records: &[R]) -> Result<usize, StoreError> {
        self.write(|w| w.append(records))
    }

    /// Records whose key falls in `range`, ordered by key ascending.
    pub fn query_range<R: SeriesRecord>(
        &self,
        range: &SeriesRange<R::Key>,
    ) -> Result<Vec<R>, StoreError> {
        let conn = self.lock();
        let (clause, values) = range.where_clause(R::KEY_COLUMN);
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} ASC, id ASC",
            R::COLUMNS.join(", "),
            R::TABLE,
            clause,
            R::KEY_COLUMN
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), R::from_row)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(row_error::<R>)
    }

    /// Every record in the series, ordered by key ascending.
    pub fn all<R: SeriesRecord>(&self) -> Result<Vec<R>, StoreError> {
        self.query_range::<R>(&SeriesRange::all())
    }

    /// The `n` most recent records, ordered by key ascending.
    pub fn latest<R: SeriesRecord>(&self, n: usize) -> Result<Vec<R>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {cols} FROM (
                SELECT id, {cols} FROM {table} ORDER BY {key} DESC, id DESC LIMIT ?1
             ) ORDER BY {key} ASC, id ASC",
            cols = R::COLUMNS.join(", "),
            table = R::TABLE,
            key = R::KEY_COLUMN
        );
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], R::from_row)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(row_error::<R>)
    }

    /// The most recent record, if any.
    pub fn last<R: SeriesRecord>(&self) -> Result<Option<R>, StoreError> {
        Ok(self.latest::<R>(1)?.pop())
    }

    pub fn count<R: SeriesRecord>(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        let rows: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(u64::try_from(rows).unwrap_or_default())
    }

    pub fn watermark<R: SeriesRecord>(&self) -> Result<Watermark, StoreError> {
        let conn = self.lock();
        let sql = format!("SELECT COUNT(*), COALESCE(MAX(id), 0) FROM {}", R::TABLE);
        let (rows, last_id): (i64, i64) =
            conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(Watermark {
            rows: u64::try_from(rows).unwrap_or_default(),
            last_id,
        })
    }

    /// Atomically replace the whole series with `records`.
    pub fn replace_all<R: SeriesRecord>(&self, records: &[R]) -> Result<usize, StoreError> {
        self.write(|w| {
            w.remove_range::<R>(&SeriesRange::all())?;
            w.append(records)
        })
    }

    /// Remove every record whose key falls in `range`.
    pub fn remove_range<R: SeriesRecord>(
        &self,
        range: &SeriesRange<R::Key>,
    ) -> Result<usize, StoreError> {
        self.write(|w| w.remove_range::<R>(range))
    }

    /// Remove the single most recent record. Returns the number removed (0 or 1).
    pub fn remove_latest<R: SeriesRecord>(&self) -> Result<usize, StoreError> {
        self.write(|w| w.remove_latest::<R>())
    }

    /// Run several writes in one transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`; otherwise nothing
    /// `f` did is visible.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&SeriesWriter<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock();
        let writer = SeriesWriter {
            tx: conn.transaction()?,
        };
        let out = f(&writer)?;
        writer.tx.commit()?;
        Ok(out)
    }

    /// Weight samples with their row ids, most recent `limit` (all when `None`).
    pub fn weight_samples_with_ids(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<StoredWeightSample>, StoreError> {
        let conn = self.lock();
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = conn.prepare(
            "SELECT id, recorded_at, subject_id, value_grams FROM (
                SELECT * FROM weight_samples ORDER BY recorded_at DESC, id DESC LIMIT ?1
             ) ORDER BY recorded_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(StoredWeightSample {
                id: row.get(0)?,
                sample: WeightSample {
                    timestamp: row.get(1)?,
                    subject_id: row.get(2)?,
                    value_grams: row.get(3)?,
                },
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete one weight sample by row id. Returns whether a row was removed.
    pub fn delete_weight_sample(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock();
        let removed = conn.execute("DELETE FROM weight_samples WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Sum of intake calories logged on local `date`.
    pub fn intake_total_for(&self, date: NaiveDate) -> Result<u64, StoreError> {
        let start = date.and_time(chrono::NaiveTime::MIN);
        let end = date
            .succ_opt()
            .map(|d| d.and_time(chrono::NaiveTime::MIN))
            .unwrap_or(NaiveDateTime::MAX);
        let events = self.query_range::<IntakeEvent>(&SeriesRange::between(start, end))?;
        Ok(events.iter().map(|e| u64::from(e.calorie_count)).sum())
    }
}

/// Write access scoped to one open transaction.
pub struct SeriesWriter<'conn> {
    tx: Transaction<'conn>,
}

impl SeriesWriter<'_> {
    pub fn append<R: SeriesRecord>(&self, records: &[R]) -> Result<usize, StoreError> {
        insert_all(&self.tx, records)
    }

    pub fn remove_range<R: SeriesRecord>(
        &self,
        range: &SeriesRange<R::Key>,
    ) -> Result<usize, StoreError> {
        let (clause, values) = range.where_clause(R::KEY_COLUMN);
        let sql = format!("DELETE FROM {}{}", R::TABLE, clause);
        Ok(self.tx.execute(&sql, params_from_iter(values))?)
    }

    pub fn remove_latest<R: SeriesRecord>(&self) -> Result<usize, StoreError> {
        let sql = format!(
            "DELETE FROM {table} WHERE id = (
                SELECT id FROM {table} ORDER BY {key} DESC, id DESC LIMIT 1
             )",
            table = R::TABLE,
            key = R::KEY_COLUMN
        );
        Ok(self.tx.execute(&sql, [])?)
    }

    pub fn last<R: SeriesRecord>(&self) -> Result<Option<R>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} DESC, id DESC LIMIT 1",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::KEY_COLUMN
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query_map([], R::from_row)?;
        Ok(rows.next().transpose()?)
    }
}

/// Conversion failures name the offending table; everything else is classified as usual.
fn row_error<R: SeriesRecord>(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => StoreError::InvalidRecord {
            table: R::TABLE,
            message: err.to_string(),
        },
        other => other.into(),
    }
}

fn insert_all<R: SeriesRecord>(conn: &Connection, records: &[R]) -> Result<usize, StoreError> {
    if records.is_empty() {
        return Ok(0);
    }
    let placeholders = (1..=R::COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut written = 0;
    for record in records {
        written += record.insert(&mut stmt)?;
    }
    Ok(written)
}
