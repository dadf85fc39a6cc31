//! Input validation utilities.
//!
//! This module contains functions for validating user inputs to ensure they meet
//! safety and correctness requirements before being used in operations.

use crate::constants::{MAX_PATIENT_ID_PREFIX_LEN, MIN_PASSWORD_LEN};
use crate::{CoreError, CoreResult};

/// Validates a patient identifier prefix.
///
/// The prefix is embedded in identifiers and in a `LIKE` pattern when the per-year counter is
/// first seeded, so it is restricted to ASCII upper-case letters and digits (no `%`, `_` or
/// `-`).
///
/// # Errors
///
/// Returns a `CoreError::InvalidInput` if the prefix is empty, too long, or contains other
/// characters.
pub fn validate_patient_id_prefix(prefix: &str) -> CoreResult<()> {
    if prefix.is_empty() {
        return Err(CoreError::InvalidInput(
            "patient identifier prefix cannot be empty".into(),
        ));
    }

    if prefix.len() > MAX_PATIENT_ID_PREFIX_LEN {
        return Err(CoreError::InvalidInput(format!(
            "patient identifier prefix exceeds maximum length of {} characters",
            MAX_PATIENT_ID_PREFIX_LEN
        )));
    }

    let ok = prefix
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'Z'));

    if !ok {
        return Err(CoreError::InvalidInput(
            "patient identifier prefix may only contain 'A'-'Z' and '0'-'9'".into(),
        ));
    }

    Ok(())
}

/// Returns true if `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_sql_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Validates a new password and its confirmation.
pub fn validate_new_password(password: &str, confirm: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    if password != confirm {
        return Err(CoreError::InvalidInput("passwords do not match".into()));
    }

    Ok(())
}
