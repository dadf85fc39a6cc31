//! Constants used throughout the Oncobloom core crate.
//!
//! This module keeps defaults and limits in one place so the store, the services
//! and the binaries agree on them.

/// Default SQLite database file when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "oncology_system.db";

/// Default prefix for allocated patient identifiers (`ONC-2025-0001`).
pub const DEFAULT_PATIENT_ID_PREFIX: &str = "ONC";

/// Default one-time code lifetime, in seconds.
pub const DEFAULT_OTP_TTL_SECS: i64 = 300;

/// Smallest accepted one-time code lifetime, in seconds.
pub const MIN_OTP_TTL_SECS: i64 = 60;

/// Largest accepted one-time code lifetime, in seconds.
pub const MAX_OTP_TTL_SECS: i64 = 3600;

/// Number of digits in a one-time code.
pub const OTP_CODE_LEN: usize = 6;

/// Default idle lifetime of an HTTP session, in minutes.
pub const DEFAULT_SESSION_LIFETIME_MINS: i64 = 60;

/// Minimum zero-padded width of the sequence part of a patient identifier.
pub const PATIENT_ID_SEQUENCE_WIDTH: usize = 4;

/// Maximum length of a patient identifier prefix.
pub const MAX_PATIENT_ID_PREFIX_LEN: usize = 16;

/// Attempts made by patient creation when an allocated identifier collides on insert.
pub const PATIENT_ID_INSERT_ATTEMPTS: usize = 5;

/// Minimum password length accepted at registration and reset.
pub const MIN_PASSWORD_LEN: usize = 6;

/// How long a connection waits on a locked database before giving up, in milliseconds.
pub const DATABASE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Columns searched by the free-text box on the patient listing.
pub const PATIENT_SEARCH_COLUMNS: &[&str] = &[
    "full_name",
    "patient_id",
    "cancer_type",
    "cancer_stage",
    "doctor_name",
    "current_status",
];
