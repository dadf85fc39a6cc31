use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, build_router, spawn_session_sweeper};
use oncobloom_core::CoreConfig;
use oncobloom_core::config::{
    database_path_from_env_value, flag_from_env_value, otp_ttl_from_env_value,
    patient_id_prefix_from_env_value, session_lifetime_from_env_value,
};

/// Main entry point for the Oncobloom application
///
/// Prepares the database, creates the default `admin` account when a password for it is
/// configured, and serves the REST API with Swagger UI.
///
/// # Environment Variables
/// - `ONCOBLOOM_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `ONCOBLOOM_DATABASE`: SQLite database file (default: "oncology_system.db")
/// - `ONCOBLOOM_ADMIN_PASSWORD`: Password for the default admin account (unset: no account)
/// - `ONCOBLOOM_ADMIN_EMAIL`: E-mail for the default admin account (default: "admin@oncology.com")
/// - `ONCOBLOOM_OTP_TTL_SECS`, `ONCOBLOOM_PATIENT_ID_PREFIX`, `ONCOBLOOM_SESSION_LIFETIME_MINS`,
///   `ONCOBLOOM_DEV_MODE`: see `oncobloom_core::config`
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, database setup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("oncobloom_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("oncobloom_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("ONCOBLOOM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::new(
        database_path_from_env_value(std::env::var("ONCOBLOOM_DATABASE").ok()),
        otp_ttl_from_env_value(std::env::var("ONCOBLOOM_OTP_TTL_SECS").ok())?,
        patient_id_prefix_from_env_value(std::env::var("ONCOBLOOM_PATIENT_ID_PREFIX").ok()),
        session_lifetime_from_env_value(std::env::var("ONCOBLOOM_SESSION_LIFETIME_MINS").ok())?,
        flag_from_env_value(std::env::var("ONCOBLOOM_DEV_MODE").ok()),
    )?);

    let state = AppState::open(cfg.clone())?;

    if let Ok(password) = std::env::var("ONCOBLOOM_ADMIN_PASSWORD") {
        let email = std::env::var("ONCOBLOOM_ADMIN_EMAIL")
            .unwrap_or_else(|_| "admin@oncology.com".into());
        if state.users.ensure_default_admin(&email, &password)? {
            tracing::info!("++ Created default admin account <{}>", email);
        }
    } else if state.users.list_admins()?.is_empty() {
        tracing::warn!("No administrator exists; set ONCOBLOOM_ADMIN_PASSWORD to create one");
    }

    spawn_session_sweeper(state.sessions.clone(), Duration::from_secs(60));

    tracing::info!("++ Starting Oncobloom REST on {}", rest_addr);
    tracing::info!("++ Database at {}", cfg.database_path().display());

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
