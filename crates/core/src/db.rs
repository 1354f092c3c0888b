//! SQLite access: connection handle, pragmas and versioned migrations.
//!
//! A single connection is shared behind a mutex, so database work is serialised per process.
//! Repository functions take `&Connection`; a `Transaction` derefs to one, so the same functions
//! run inside [`Database::with_transaction`].

use crate::constants::{DATETIME_FORMAT, DATE_FORMAT};
use crate::{HmsError, HmsResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../migrations/001_initial.sql")),
    (2, include_str!("../migrations/002_bed_occupancy_view.sql")),
    (3, include_str!("../migrations/003_cache_and_settings.sql")),
    (4, include_str!("../migrations/004_report_schedules.sql")),
    (5, include_str!("../migrations/005_billing_discounts.sql")),
];

/// Shared database handle, cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database file at `path` and run pending migrations.
    pub fn open(path: &Path) -> HmsResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database with the full schema (for tests and dry runs).
    pub fn open_in_memory() -> HmsResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> HmsResult<Self> {
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> HmsResult<T>) -> HmsResult<T> {
        let guard = self.conn.lock().map_err(|_| HmsError::LockPoisoned)?;
        f(&guard)
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> HmsResult<T>,
    ) -> HmsResult<T> {
        let mut guard = self.conn.lock().map_err(|_| HmsError::LockPoisoned)?;
        let tx = guard.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn configure_pragmas(conn: &Connection) -> HmsResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> HmsResult<()> {
    let current_version = current_schema_version(conn);

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| HmsError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Current schema version (0 if no schema exists yet).
pub fn current_schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Latest schema version this build knows about.
pub fn latest_schema_version() -> i64 {
    MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0)
}

pub fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub fn parse_datetime(value: &str) -> HmsResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT)
        .map_err(|_| HmsError::InvalidTimestamp(value.to_string()))
}

pub fn parse_date(value: &str) -> HmsResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| HmsError::InvalidTimestamp(value.to_string()))
}

/// Current UTC time truncated to whole seconds (the storage precision).
pub fn now() -> NaiveDateTime {
    let now = chrono::Utc::now().naive_utc();
    parse_datetime(&fmt_datetime(&now)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_database_is_fully_migrated() {
        let db = Database::open_in_memory().unwrap();
        let version = db.with_conn(|c| Ok(current_schema_version(c))).unwrap();
        assert_eq!(version, latest_schema_version());
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(run_migrations).unwrap();
    }

    #[test]
    fn foreign_keys_enabled() {
        let db = Database::open_in_memory().unwrap();
        let fk: i64 = db
            .with_conn(|c| Ok(c.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn file_database_reopens_without_rerunning_migrations() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hms.sqlite3");
        Database::open(&path).unwrap();
        let db = Database::open(&path).unwrap();
        let rows: i64 = db
            .with_conn(|c| {
                Ok(c.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(rows, latest_schema_version());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let res: HmsResult<()> = db.with_transaction(|tx| {
            tx.execute("INSERT INTO branches (name) VALUES ('North')", [])?;
            Err(HmsError::Conflict("abort".into()))
        });
        assert!(res.is_err());
        let count: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM branches", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn datetime_round_trips_storage_format() {
        let dt = parse_datetime("2024-03-01 08:30:00").unwrap();
        assert_eq!(fmt_datetime(&dt), "2024-03-01 08:30:00");
        assert!(parse_datetime("yesterday").is_err());
    }
}
