//! # Oncobloom Core
//!
//! Core business logic for the Oncobloom patient management and data-entry ledger system.
//!
//! This crate contains the data operations and the rules around them:
//! - One-time code issuance and validation for password resets
//! - Sequential `PREFIX-YYYY-NNNN` patient identifiers backed by an atomic counter
//! - Parameterised filter composition for record listings
//! - Users, sessions, patient records and ledger entries on SQLite
//!
//! **No API concerns**: HTTP servers, request parsing and status codes belong in `api-rest` and
//! `api-shared`.

pub mod clock;
pub mod config;
pub mod constants;
pub mod entries;
pub mod error;
pub mod filter;
pub mod notify;
pub mod otp;
pub mod password;
pub mod password_reset;
pub mod patient_id;
pub mod patients;
pub mod session;
pub mod store;
pub mod users;
pub mod validation;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult, FilterError, OtpError};
pub use filter::{build_filter, FilterSpec, QueryPredicate};
pub use otp::{OtpCode, OtpManager, OtpStore};
pub use patient_id::{IdAllocator, PatientIdentifier};
pub use session::{Session, SessionRegistry, SessionUser};
pub use store::Database;
