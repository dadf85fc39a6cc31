use oncobloom_types::TextError;

/// Outcome of a failed one-time code validation.
///
/// All three are recoverable: the caller re-prompts or requests a new code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("no one-time code is pending")]
    NotFound,
    #[error("one-time code has expired")]
    Expired,
    #[error("one-time code does not match")]
    Mismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid filter column: {0}")]
    InvalidColumn(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Text(#[from] TextError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("authentication required")]
    Unauthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("operation not permitted: {0}")]
    Forbidden(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("identifier {0} is already taken, retry allocation")]
    DuplicateIdentifier(String),
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("failed to hash password: {0}")]
    PasswordHash(String),
    // The rusqlite error can carry statement text, so it is only exposed as the source.
    #[error("database operation failed")]
    Database(#[source] rusqlite::Error),
}

impl CoreError {
    /// Whether repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::DuplicateIdentifier(_))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err)
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// True when `err` is a UNIQUE/PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_hides_statement_text() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn
            .execute("SELEKT secret_column FROM nowhere", [])
            .expect_err("malformed statement should fail");

        let core: CoreError = err.into();
        let shown = core.to_string();
        assert_eq!(shown, "database operation failed");
        assert!(!shown.contains("secret_column"));
        assert!(std::error::Error::source(&core).is_some());
    }

    #[test]
    fn test_only_duplicate_identifier_is_retryable() {
        assert!(CoreError::DuplicateIdentifier("ONC-2025-0001".into()).is_retryable());
        assert!(!CoreError::Otp(OtpError::Expired).is_retryable());
        assert!(!CoreError::NotFound("patient").is_retryable());
    }
}
