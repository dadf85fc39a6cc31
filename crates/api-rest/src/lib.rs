//! # API REST
//!
//! REST API implementation for Oncobloom.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, session tokens)
//!
//! Uses `api-shared` for wire types and `oncobloom-core` for everything else. Core calls touch
//! SQLite and hash passwords, so handlers run them on the blocking thread pool.

#![warn(rust_2018_idioms)]

pub mod admin;
pub mod auth;
pub mod convert;
pub mod entries;
pub mod error;
pub mod patients;
pub mod state;

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use api_shared::{parse_session_token, AuthError, HealthService, SESSION_HEADER};
use error::{ApiError, ApiResult};
use oncobloom_core::{CoreResult, SessionRegistry, SessionUser};

pub use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        auth::create_session,
        auth::register,
        auth::login,
        auth::logout,
        auth::me,
        auth::forgot_password,
        auth::verify_otp,
        auth::reset_password,
        auth::change_password,
        patients::list_patients,
        patients::create_patient,
        patients::patient_stats,
        patients::patient_analytics,
        patients::get_patient,
        patients::update_patient,
        patients::delete_patient,
        entries::list_entries,
        entries::create_entry,
        entries::get_entry,
        entries::update_entry,
        entries::delete_entry,
        admin::list_users,
        admin::promote_user,
        admin::demote_user,
        admin::delete_user,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::MessageRes,
        api_shared::SessionRes,
        api_shared::RegisterReq,
        api_shared::UserRes,
        api_shared::AdminUserRes,
        api_shared::ListUsersRes,
        api_shared::LoginReq,
        api_shared::LoginRes,
        api_shared::ForgotPasswordReq,
        api_shared::ForgotPasswordRes,
        api_shared::VerifyOtpReq,
        api_shared::ResetPasswordReq,
        api_shared::ChangePasswordReq,
        api_shared::PatientReq,
        api_shared::PatientRes,
        api_shared::FilterOptionsRes,
        api_shared::ListPatientsRes,
        api_shared::CountRes,
        api_shared::PatientStatsRes,
        api_shared::PatientAnalyticsRes,
        api_shared::EntryReq,
        api_shared::EntryRes,
        api_shared::EntrySummaryRes,
        api_shared::ListEntriesRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full application router, including Swagger UI.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(auth::create_session))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/forgot", post(auth::forgot_password))
        .route("/auth/otp", post(auth::verify_otp))
        .route("/auth/reset", post(auth::reset_password))
        .route("/auth/password", post(auth::change_password))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route("/patients/stats", get(patients::patient_stats))
        .route("/patients/analytics", get(patients::patient_analytics))
        .route(
            "/patients/:patient_id",
            get(patients::get_patient)
                .put(patients::update_patient)
                .delete(patients::delete_patient),
        )
        .route(
            "/entries",
            get(entries::list_entries).post(entries::create_entry),
        )
        .route(
            "/entries/:id",
            get(entries::get_entry)
                .put(entries::update_entry)
                .delete(entries::delete_entry),
        )
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id/promote", post(admin::promote_user))
        .route("/admin/users/:id/demote", post(admin::demote_user))
        .route("/admin/users/:id", delete(admin::delete_user))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically drops idle sessions so abandoned ones do not accumulate.
pub fn spawn_session_sweeper(sessions: SessionRegistry, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                tracing::debug!("purged {} expired sessions", purged);
            }
        }
    });
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = api_shared::HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Reports whether the service is up and the database answers a trivial query. This endpoint
/// is used for monitoring and load balancer health checks.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<api_shared::HealthRes> {
    let store_ok = match tokio::task::spawn_blocking(move || state.db.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!("Health check database error: {:?}", e);
            false
        }
        Err(e) => {
            tracing::error!("Health check task error: {:?}", e);
            false
        }
    };
    Json(HealthService::check_health(store_ok))
}

/// Reads the session token from the request headers.
pub(crate) fn session_token(headers: &HeaderMap) -> ApiResult<Uuid> {
    let raw = headers
        .get(SESSION_HEADER)
        .map(|v| v.to_str().map_err(|_| AuthError::Malformed))
        .transpose()?;
    Ok(parse_session_token(raw)?)
}

/// The user logged in to the session, or `Unauthenticated`.
pub(crate) fn current_user(state: &AppState, token: Uuid) -> CoreResult<SessionUser> {
    state
        .sessions
        .with_session(token, |session| session.require_user().cloned())
}

/// Runs a core operation on the blocking pool and maps its error for the response.
pub(crate) async fn blocking<T, F>(context: &'static str, op: F) -> ApiResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result.map_err(|e| ApiError::from_core(context, e)),
        Err(e) => {
            tracing::error!("{}: worker task failed: {:?}", context, e);
            Err(ApiError::internal())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Datelike, Utc};
    use http_body_util::BodyExt;
    use oncobloom_core::notify::{Notifier, NotifyError};
    use oncobloom_core::{CoreConfig, Database, OtpCode};
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    /// Records every code it is asked to deliver.
    #[derive(Default)]
    struct Outbox {
        codes: Mutex<Vec<String>>,
    }

    impl Outbox {
        fn last(&self) -> String {
            self.codes.lock().unwrap().last().cloned().expect("no code sent")
        }
    }

    impl Notifier for Outbox {
        fn send_otp(
            &self,
            _recipient: &str,
            code: &OtpCode,
            _ttl: chrono::Duration,
        ) -> Result<(), NotifyError> {
            self.codes.lock().unwrap().push(code.as_str().to_owned());
            Ok(())
        }
    }

    struct TestApp {
        router: Router,
        outbox: Arc<Outbox>,
    }

    impl TestApp {
        fn new() -> Self {
            let cfg = Arc::new(CoreConfig::with_database(PathBuf::from(":memory:")));
            let db = Database::open_in_memory().unwrap();
            let outbox = Arc::new(Outbox::default());
            let state = AppState::new(cfg, db, outbox.clone());
            state
                .users
                .ensure_default_admin("admin@oncology.com", "admin123")
                .unwrap();
            Self {
                router: build_router(state),
                outbox,
            }
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(SESSION_HEADER, token);
            }
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn login(&self, identity: &str, password: &str) -> String {
            let (status, body) = self
                .call(
                    "POST",
                    "/auth/login",
                    None,
                    Some(json!({ "identity": identity, "password": password })),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "login failed: {body}");
            body["token"].as_str().unwrap().to_owned()
        }

        async fn register(&self, username: &str) {
            let (status, body) = self
                .call(
                    "POST",
                    "/auth/register",
                    None,
                    Some(json!({
                        "username": username,
                        "email": format!("{username}@oncology.com"),
                        "password": "secret1",
                        "confirm_password": "secret1",
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        }
    }

    fn patient(name: &str, stage: &str, status: &str) -> Value {
        json!({
            "full_name": name,
            "age": 54,
            "gender": "Female",
            "cancer_type": "Breast",
            "cancer_stage": stage,
            "current_status": status,
            "height": 165.0,
            "weight": 60.0,
        })
    }

    #[tokio::test]
    async fn test_health_reports_database() {
        let app = TestApp::new();
        let (status, body) = app.call("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["database"], "connected");
    }

    #[tokio::test]
    async fn test_protected_routes_need_a_logged_in_session() {
        let app = TestApp::new();

        let (status, _) = app.call("GET", "/patients", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.call("GET", "/entries", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, session) = app.call("POST", "/sessions", None, None).await;
        let anonymous = session["token"].as_str().unwrap();
        let (status, _) = app.call("GET", "/patients", Some(anonymous), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_patient_lifecycle() {
        let app = TestApp::new();
        let token = app.login("admin", "admin123").await;

        let (status, created) = app
            .call(
                "POST",
                "/patients",
                Some(&token),
                Some(patient("Jane Smith", "Stage IV", "Active Treatment")),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        let year = Utc::now().year();
        assert_eq!(created["patient_id"], format!("ONC-{year}-0001"));
        assert_eq!(created["bmi"], 22.04);

        app.call(
            "POST",
            "/patients",
            Some(&token),
            Some(patient("Ravi Kumar", "Stage II", "Recovered")),
        )
        .await;

        let (status, listed) = app
            .call("GET", "/patients?status=Recovered&search=", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let patients = listed["patients"].as_array().unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0]["full_name"], "Ravi Kumar");
        assert_eq!(listed["filters"]["cancer_stages"], json!(["Stage II", "Stage IV"]));

        let (_, stats) = app.call("GET", "/patients/stats", Some(&token), None).await;
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["stage_iv"], 1);
        assert_eq!(stats["recovered"], 1);

        let (status, analytics) = app
            .call("GET", "/patients/analytics", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analytics["by_gender"], json!([{ "value": "Female", "count": 2 }]));
        assert_eq!(analytics["age_groups"][3], json!({ "value": "51-65", "count": 2 }));
        assert_eq!(analytics["age_groups"].as_array().unwrap().len(), 5);

        let uri = format!("/patients/ONC-{year}-0001");
        let mut update = patient("Jane Smith", "Stage IV", "Remission");
        update["doctor_name"] = json!("Dr. Rao");
        let (status, updated) = app.call("PUT", &uri, Some(&token), Some(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["current_status"], "Remission");
        assert_eq!(updated["patient_id"], format!("ONC-{year}-0001"));

        let (status, _) = app.call("DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_patient_is_rejected() {
        let app = TestApp::new();
        let token = app.login("admin", "admin123").await;

        let mut body = patient("Jane Smith", "Stage I", "Active Treatment");
        body["age"] = json!(0);
        let (status, _) = app.call("POST", "/patients", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_only_creator_or_admin_changes_patient() {
        let app = TestApp::new();
        app.register("alice").await;
        app.register("bob").await;
        let alice = app.login("alice", "secret1").await;
        let bob = app.login("bob@oncology.com", "secret1").await;

        let (_, created) = app
            .call(
                "POST",
                "/patients",
                Some(&alice),
                Some(patient("Jane Smith", "Stage I", "Active Treatment")),
            )
            .await;
        let uri = format!("/patients/{}", created["patient_id"].as_str().unwrap());

        let (status, _) = app.call("GET", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("DELETE", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call("DELETE", &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_ids() {
        let app = Arc::new(TestApp::new());
        let token = app.login("admin", "admin123").await;

        let mut tasks = Vec::new();
        for i in 0..12 {
            let app = app.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                let (status, body) = app
                    .call(
                        "POST",
                        "/patients",
                        Some(&token),
                        Some(patient(&format!("Patient {i}"), "Stage I", "Active Treatment")),
                    )
                    .await;
                assert_eq!(status, StatusCode::CREATED);
                body["patient_id"].as_str().unwrap().to_owned()
            }));
        }

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap());
        }
        assert_eq!(ids.len(), 12);
        let year = Utc::now().year();
        for seq in 1..=12 {
            assert!(ids.contains(&format!("ONC-{year}-{seq:04}")));
        }
    }

    #[tokio::test]
    async fn test_password_reset_over_http() {
        let app = TestApp::new();
        app.register("alice").await;

        let (status, session) = app.call("POST", "/sessions", None, None).await;
        assert_eq!(status, StatusCode::CREATED);
        let token = session["token"].as_str().unwrap().to_owned();

        let (status, body) = app
            .call(
                "POST",
                "/auth/forgot",
                Some(&token),
                Some(json!({ "identity": "Alice@Oncology.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["code_delivered"], true);

        let code = app.outbox.last();
        let wrong = if code == "100000" { "100001" } else { "100000" };
        let (status, _) = app
            .call("POST", "/auth/otp", Some(&token), Some(json!({ "code": wrong })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(
                "POST",
                "/auth/reset",
                Some(&token),
                Some(json!({ "password": "newpass1", "confirm_password": "newpass1" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .call("POST", "/auth/otp", Some(&token), Some(json!({ "code": code })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call(
                "POST",
                "/auth/reset",
                Some(&token),
                Some(json!({ "password": "newpass1", "confirm_password": "newpass1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "identity": "alice", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        app.login("alice", "newpass1").await;
    }

    #[tokio::test]
    async fn test_reset_code_is_bound_to_its_session() {
        let app = TestApp::new();
        app.register("alice").await;

        let (_, first) = app.call("POST", "/sessions", None, None).await;
        let (_, second) = app.call("POST", "/sessions", None, None).await;
        let first = first["token"].as_str().unwrap().to_owned();
        let second = second["token"].as_str().unwrap().to_owned();

        app.call(
            "POST",
            "/auth/forgot",
            Some(&first),
            Some(json!({ "identity": "alice" })),
        )
        .await;
        let code = app.outbox.last();

        let (status, _) = app
            .call("POST", "/auth/otp", Some(&second), Some(json!({ "code": code })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_entries_are_scoped_to_their_owner() {
        let app = TestApp::new();
        app.register("alice").await;
        app.register("bob").await;
        let alice = app.login("alice", "secret1").await;
        let bob = app.login("bob", "secret1").await;

        let entry = json!({ "name": "Ravi", "gender": "Male", "amount": 120.5, "date": "2025-03-01" });
        let (status, created) = app
            .call("POST", "/entries", Some(&alice), Some(entry.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = app.call("POST", "/entries", Some(&alice), Some(entry)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .call(
                "POST",
                "/entries",
                Some(&alice),
                Some(json!({ "name": "Mira", "gender": "robot", "amount": 1.0, "date": "2025-03-01" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/entries/{}", created["id"]);
        let (status, _) = app.call("GET", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, bob_list) = app.call("GET", "/entries", Some(&bob), None).await;
        assert_eq!(bob_list["summary"]["total_entries"], 0);

        let admin = app.login("admin", "admin123").await;
        let (_, all) = app.call("GET", "/entries", Some(&admin), None).await;
        assert_eq!(all["summary"]["total_entries"], 1);
        assert_eq!(all["summary"]["male_count"], 1);
        assert_eq!(all["entries"][0]["owner_name"], "alice");
    }

    #[tokio::test]
    async fn test_admin_routes() {
        let app = TestApp::new();
        app.register("alice").await;
        let alice = app.login("alice", "secret1").await;

        let (status, _) = app.call("GET", "/admin/users", Some(&alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .call(
                "POST",
                "/patients",
                Some(&alice),
                Some(patient("Jane Smith", "Stage I", "Active Treatment")),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let admin = app.login("admin", "admin123").await;
        let (status, listed) = app.call("GET", "/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let users = listed["users"].as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(listed["total_users"], 2);
        assert_eq!(listed["total_admins"], 1);
        assert_eq!(listed["total_patients"], 1);
        let alice_row = users.iter().find(|u| u["username"] == "alice").unwrap();
        assert_eq!(alice_row["patient_count"], 1);
        let alice_id = users
            .iter()
            .find(|u| u["username"] == "alice")
            .map(|u| u["id"].as_i64().unwrap())
            .unwrap();

        let (status, promoted) = app
            .call("POST", &format!("/admin/users/{alice_id}/promote"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(promoted["is_admin"], true);

        let (_, me) = app.call("GET", "/auth/me", Some(&admin), None).await;
        let admin_id = me["id"].as_i64().unwrap();
        let (status, _) = app
            .call("DELETE", &format!("/admin/users/{admin_id}"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call("DELETE", &format!("/admin/users/{alice_id}"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "identity": "alice", "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let app = TestApp::new();
        let token = app.login("admin", "admin123").await;

        let (status, _) = app.call("POST", "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("GET", "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_replaces_the_presented_session() {
        let app = TestApp::new();
        let first = app.login("admin", "admin123").await;

        let (status, body) = app
            .call(
                "POST",
                "/auth/login",
                Some(&first),
                Some(json!({ "identity": "admin", "password": "admin123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let second = body["token"].as_str().unwrap().to_owned();
        assert_ne!(first, second);

        let (status, _) = app.call("GET", "/auth/me", Some(&first), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, me) = app.call("GET", "/auth/me", Some(&second), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "admin");

        let (status, _) = app.call("POST", "/auth/logout", Some(&first), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
