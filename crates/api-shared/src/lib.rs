//! # API Shared
//!
//! Shared utilities and definitions for Oncobloom APIs.
//!
//! Contains:
//! - Request/response types with OpenAPI schemas (`dto` module)
//! - Shared services like `HealthService`
//! - Session token utilities
//!
//! Used by `api-rest` and the workspace binary for common functionality.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{parse_session_token, AuthError, SESSION_HEADER};
pub use dto::*;
pub use health::HealthService;
