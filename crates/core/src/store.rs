//! SQLite persistence.
//!
//! [`Database`] owns a single connection behind a mutex. Handles are cheap to clone and every
//! service borrows the connection only for the duration of one operation. Several `Database`
//! values may point at the same file; SQLite serialises their write transactions and the busy
//! timeout makes a blocked writer wait instead of failing.

use crate::constants::DATABASE_BUSY_TIMEOUT_MS;
use crate::{CoreError, CoreResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    full_name     TEXT,
    password_hash TEXT NOT NULL,
    is_admin      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patients (
    id                           INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id                   TEXT NOT NULL UNIQUE,
    full_name                    TEXT NOT NULL,
    age                          INTEGER NOT NULL,
    gender                       TEXT NOT NULL,
    blood_group                  TEXT,
    contact_number               TEXT,
    email                        TEXT,
    city                         TEXT,
    state                        TEXT,
    emergency_contact_name       TEXT,
    emergency_contact_number     TEXT,
    cancer_type                  TEXT NOT NULL,
    cancer_stage                 TEXT NOT NULL,
    tumor_size                   REAL,
    metastasis                   TEXT,
    diagnosis_date               TEXT,
    treatment_type               TEXT,
    treatment_phase              TEXT,
    chemo_cycles_planned         INTEGER,
    chemo_cycles_completed       INTEGER,
    radiation_sessions_planned   INTEGER,
    radiation_sessions_completed INTEGER,
    surgery_status               TEXT,
    doctor_name                  TEXT,
    hospital_name                TEXT,
    height                       REAL,
    weight                       REAL,
    bmi                          REAL,
    blood_pressure               TEXT,
    heart_rate                   INTEGER,
    risk_level                   TEXT,
    current_status               TEXT NOT NULL,
    next_appointment             TEXT,
    created_by                   INTEGER REFERENCES users (id) ON DELETE SET NULL,
    created_at                   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_status ON patients (current_status);
CREATE INDEX IF NOT EXISTS idx_patients_stage ON patients (cancer_stage);
CREATE INDEX IF NOT EXISTS idx_patients_cancer_type ON patients (cancer_type);

CREATE TABLE IF NOT EXISTS patient_id_counters (
    prefix        TEXT NOT NULL,
    year          INTEGER NOT NULL,
    last_sequence INTEGER NOT NULL,
    PRIMARY KEY (prefix, year)
);

CREATE TABLE IF NOT EXISTS entries (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    name    TEXT NOT NULL,
    gender  TEXT NOT NULL,
    amount  REAL NOT NULL,
    date    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_user_id ON entries (user_id);
";

/// Shared handle to the application database.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (creating if needed) the database file and applies the schema.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// A private in-memory database, used by tests and throwaway tooling.
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CoreResult<Self> {
        conn.busy_timeout(Duration::from_millis(DATABASE_BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "foreign_keys", true)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Creates any missing tables and indexes. Safe to run repeatedly.
    pub fn migrate(&self) -> CoreResult<()> {
        self.connection()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Borrows the connection for one operation.
    pub fn connection(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        // A poisoned lock only means another request panicked mid-operation; SQLite has
        // already rolled back whatever it was doing.
        Ok(self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Round-trips a trivial query; used by health checks.
    pub fn ping(&self) -> CoreResult<()> {
        let one: i64 = self
            .connection()?
            .query_row("SELECT 1", [], |row| row.get(0))?;
        if one == 1 {
            Ok(())
        } else {
            Err(CoreError::InvalidInput("unexpected ping result".into()))
        }
    }
}
