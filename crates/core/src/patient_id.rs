//! Sequential patient identifiers of the form `PREFIX-YYYY-NNNN`.
//!
//! Sequences are per `(prefix, year)` and start at 1 each calendar year. The last issued
//! sequence lives in `patient_id_counters`; allocation increments it inside an immediate
//! (write-locking) transaction, so two concurrent allocations can never observe the same
//! value even when they come from different connections or processes.
//!
//! The first allocation for a `(prefix, year)` seeds the counter from identifiers already
//! present in `patients`, so databases populated before the counter table existed carry on
//! from their highest sequence instead of reissuing it.

use crate::constants::PATIENT_ID_SEQUENCE_WIDTH;
use crate::store::Database;
use crate::validation::validate_patient_id_prefix;
use crate::{CoreError, CoreResult};
use chrono::{Datelike, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::fmt;
use std::str::FromStr;

/// A parsed patient identifier.
///
/// Sequences below 10000 are zero-padded to four digits; larger ones are printed in full, so
/// ordering by sequence is numeric, not lexical.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PatientIdentifier {
    prefix: String,
    year: i32,
    sequence: u32,
}

impl PatientIdentifier {
    pub fn new(prefix: &str, year: i32, sequence: u32) -> CoreResult<Self> {
        validate_patient_id_prefix(prefix)?;
        validate_year(year)?;
        if sequence == 0 {
            return Err(CoreError::InvalidInput(
                "patient identifier sequence starts at 1".into(),
            ));
        }
        Ok(Self {
            prefix: prefix.to_owned(),
            year,
            sequence,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for PatientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04}-{:0width$}",
            self.prefix,
            self.year,
            self.sequence,
            width = PATIENT_ID_SEQUENCE_WIDTH
        )
    }
}

impl FromStr for PatientIdentifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidInput(format!("malformed patient identifier: {s}"));

        let mut parts = s.trim().splitn(3, '-');
        let (Some(prefix), Some(year), Some(sequence)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if year.len() != 4 || sequence.len() < PATIENT_ID_SEQUENCE_WIDTH {
            return Err(invalid());
        }
        if !year.bytes().chain(sequence.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let sequence = sequence.parse::<u32>().map_err(|_| invalid())?;
        Self::new(prefix, year, sequence)
    }
}

fn validate_year(year: i32) -> CoreResult<()> {
    if !(1..=9999).contains(&year) {
        return Err(CoreError::InvalidInput(format!(
            "patient identifier year out of range: {year}"
        )));
    }
    Ok(())
}

/// Reserves the next sequence for `(prefix, year)` inside an already-open write transaction.
///
/// The caller commits. Callers that insert the patient row in the same transaction get the
/// identifier and the row atomically.
pub(crate) fn next_sequence(conn: &Connection, prefix: &str, year: i32) -> CoreResult<u32> {
    let stem = format!("{prefix}-{year:04}-");
    let pattern = format!("{stem}%");
    // substr() is 1-based; the sequence starts right after the stem.
    let suffix_start = stem.len() as i64 + 1;

    conn.execute(
        "INSERT OR IGNORE INTO patient_id_counters (prefix, year, last_sequence)
         SELECT ?1, ?2, COALESCE(MAX(CAST(substr(patient_id, ?4) AS INTEGER)), 0)
         FROM patients
         WHERE patient_id LIKE ?3",
        rusqlite::params![prefix, year, pattern, suffix_start],
    )?;

    let sequence: i64 = conn.query_row(
        "UPDATE patient_id_counters
         SET last_sequence = last_sequence + 1
         WHERE prefix = ?1 AND year = ?2
         RETURNING last_sequence",
        rusqlite::params![prefix, year],
        |row| row.get(0),
    )?;

    u32::try_from(sequence).map_err(|_| {
        CoreError::InvalidInput(format!(
            "patient identifier sequence exhausted for {prefix}-{year}"
        ))
    })
}

/// Hands out patient identifiers backed by the shared database.
#[derive(Clone, Debug)]
pub struct IdAllocator {
    db: Database,
}

impl IdAllocator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Allocates the next identifier for `prefix` in `year`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for a malformed prefix or year, and
    /// `CoreError::Database` if the counter cannot be updated.
    pub fn allocate(&self, prefix: &str, year: i32) -> CoreResult<PatientIdentifier> {
        validate_patient_id_prefix(prefix)?;
        validate_year(year)?;

        let mut conn = self.db.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let sequence = next_sequence(&tx, prefix, year)?;
        tx.commit()?;

        let id = PatientIdentifier {
            prefix: prefix.to_owned(),
            year,
            sequence,
        };
        tracing::debug!("allocated patient identifier {}", id);
        Ok(id)
    }

    /// Allocates for the current UTC year.
    pub fn allocate_current(&self, prefix: &str) -> CoreResult<PatientIdentifier> {
        self.allocate(prefix, Utc::now().year())
    }
}
