use uuid::Uuid;

/// Header carrying the session token returned by `POST /sessions` and `POST /auth/login`.
pub const SESSION_HEADER: &str = "x-session-token";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing x-session-token header")]
    Missing,
    #[error("malformed session token")]
    Malformed,
}

/// Parses the raw session header value.
///
/// Returns `Ok(uuid)` for a well-formed token, or an error if it is absent or malformed.
/// Whether the session actually exists is decided by the caller.
pub fn parse_session_token(raw: Option<&str>) -> Result<Uuid, AuthError> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty());
    let raw = raw.ok_or(AuthError::Missing)?;
    Uuid::parse_str(raw).map_err(|_| AuthError::Malformed)
}
