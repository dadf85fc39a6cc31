//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the Oncobloom REST API (with OpenAPI/Swagger UI) on its own. The workspace's main
//! `oncobloom-run` binary additionally prepares the database and the default administrator
//! before serving.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{build_router, spawn_session_sweeper, AppState};
use oncobloom_core::config::{
    database_path_from_env_value, flag_from_env_value, otp_ttl_from_env_value,
    patient_id_prefix_from_env_value, session_lifetime_from_env_value,
};
use oncobloom_core::CoreConfig;

/// Main entry point for the Oncobloom REST API server
///
/// # Environment Variables
/// - `ONCOBLOOM_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `ONCOBLOOM_DATABASE`: SQLite database file (default: "oncology_system.db")
/// - `ONCOBLOOM_OTP_TTL_SECS`: Reset code lifetime in seconds (default: 300)
/// - `ONCOBLOOM_PATIENT_ID_PREFIX`: Patient identifier prefix (default: "ONC")
/// - `ONCOBLOOM_SESSION_LIFETIME_MINS`: Idle session lifetime (default: 60)
/// - `ONCOBLOOM_DEV_MODE`: Write reset codes to the log (default: off)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the database cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("oncobloom_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("ONCOBLOOM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::new(
        database_path_from_env_value(std::env::var("ONCOBLOOM_DATABASE").ok()),
        otp_ttl_from_env_value(std::env::var("ONCOBLOOM_OTP_TTL_SECS").ok())?,
        patient_id_prefix_from_env_value(std::env::var("ONCOBLOOM_PATIENT_ID_PREFIX").ok()),
        session_lifetime_from_env_value(std::env::var("ONCOBLOOM_SESSION_LIFETIME_MINS").ok())?,
        flag_from_env_value(std::env::var("ONCOBLOOM_DEV_MODE").ok()),
    )?);

    let state = AppState::open(cfg.clone())?;
    spawn_session_sweeper(state.sessions.clone(), Duration::from_secs(60));

    tracing::info!(
        "-- Starting Oncobloom REST API on {} (database {})",
        addr,
        cfg.database_path().display()
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
