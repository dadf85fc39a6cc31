//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.
//!
//! The `*_from_env_value` helpers take the raw `Option<String>` so binaries do the `std::env`
//! lookup and tests can exercise parsing without touching the environment.

use crate::constants::{
    DEFAULT_DATABASE_PATH, DEFAULT_OTP_TTL_SECS, DEFAULT_PATIENT_ID_PREFIX,
    DEFAULT_SESSION_LIFETIME_MINS, MAX_OTP_TTL_SECS, MIN_OTP_TTL_SECS,
};
use crate::validation::validate_patient_id_prefix;
use crate::{CoreError, CoreResult};
use chrono::Duration;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    otp_ttl: Duration,
    patient_id_prefix: String,
    session_lifetime: Duration,
    dev_mode: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        database_path: PathBuf,
        otp_ttl: Duration,
        patient_id_prefix: String,
        session_lifetime: Duration,
        dev_mode: bool,
    ) -> CoreResult<Self> {
        validate_patient_id_prefix(&patient_id_prefix)?;

        let ttl_secs = otp_ttl.num_seconds();
        if !(MIN_OTP_TTL_SECS..=MAX_OTP_TTL_SECS).contains(&ttl_secs) {
            return Err(CoreError::InvalidInput(format!(
                "OTP TTL must be between {MIN_OTP_TTL_SECS} and {MAX_OTP_TTL_SECS} seconds"
            )));
        }

        if session_lifetime <= Duration::zero() {
            return Err(CoreError::InvalidInput(
                "session lifetime must be positive".into(),
            ));
        }

        Ok(Self {
            database_path,
            otp_ttl,
            patient_id_prefix,
            session_lifetime,
            dev_mode,
        })
    }

    /// Defaults suitable for tests and local development.
    pub fn with_database(database_path: PathBuf) -> Self {
        Self {
            database_path,
            otp_ttl: Duration::seconds(DEFAULT_OTP_TTL_SECS),
            patient_id_prefix: DEFAULT_PATIENT_ID_PREFIX.into(),
            session_lifetime: Duration::minutes(DEFAULT_SESSION_LIFETIME_MINS),
            dev_mode: false,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn otp_ttl(&self) -> Duration {
        self.otp_ttl
    }

    pub fn patient_id_prefix(&self) -> &str {
        &self.patient_id_prefix
    }

    pub fn session_lifetime(&self) -> Duration {
        self.session_lifetime
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve the database path, falling back to [`DEFAULT_DATABASE_PATH`].
pub fn database_path_from_env_value(value: Option<String>) -> PathBuf {
    non_blank(value)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
}

/// Parse the OTP TTL (seconds). Range checking happens in [`CoreConfig::new`].
pub fn otp_ttl_from_env_value(value: Option<String>) -> CoreResult<Duration> {
    let secs = match non_blank(value) {
        Some(v) => v
            .parse::<i64>()
            .map_err(|_| CoreError::InvalidInput(format!("OTP TTL is not a number: {v}")))?,
        None => DEFAULT_OTP_TTL_SECS,
    };
    Ok(Duration::seconds(secs))
}

/// Parse the session lifetime (minutes).
pub fn session_lifetime_from_env_value(value: Option<String>) -> CoreResult<Duration> {
    let mins = match non_blank(value) {
        Some(v) => v.parse::<i64>().map_err(|_| {
            CoreError::InvalidInput(format!("session lifetime is not a number: {v}"))
        })?,
        None => DEFAULT_SESSION_LIFETIME_MINS,
    };
    Ok(Duration::minutes(mins))
}

/// Resolve the patient identifier prefix, upper-casing it.
pub fn patient_id_prefix_from_env_value(value: Option<String>) -> String {
    non_blank(value)
        .map(|v| v.to_uppercase())
        .unwrap_or_else(|| DEFAULT_PATIENT_ID_PREFIX.into())
}

/// Interpret a boolean flag (`1`, `true`, `yes`, `on`; anything else is false).
pub fn flag_from_env_value(value: Option<String>) -> bool {
    non_blank(value)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
