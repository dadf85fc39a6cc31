//! Patient record endpoints. All of them require a logged-in session.

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};

use crate::convert::{
    analytics_res, filter_options_res, list_filter, patient_details, patient_res, stats_res,
};
use crate::error::ApiResult;
use crate::{blocking, current_user, session_token, AppState};
use api_shared::{
    ListPatientsQuery, ListPatientsRes, MessageRes, PatientAnalyticsRes, PatientReq, PatientRes,
    PatientStatsRes,
};

#[utoipa::path(
    get,
    path = "/patients",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ListPatientsQuery
    ),
    responses(
        (status = 200, description = "Matching patients and the available filter values", body = ListPatientsRes),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
/// List patients, newest first
///
/// Status, cancer type and stage match exactly. The search term is matched as a substring
/// against several columns. Blank filters are ignored.
#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListPatientsQuery>,
) -> ApiResult<Json<ListPatientsRes>> {
    let token = session_token(&headers)?;
    let (patients, options) = blocking("List patients error", move || {
        current_user(&state, token)?;
        let patients = state.patients.list(&list_filter(query))?;
        let options = state.patients.filter_options()?;
        Ok((patients, options))
    })
    .await?;

    Ok(Json(ListPatientsRes {
        patients: patients.into_iter().map(patient_res).collect(),
        filters: filter_options_res(options),
    }))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientReq,
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 201, description = "Patient created", body = PatientRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Not logged in"),
        (status = 409, description = "Identifier collision"),
        (status = 500, description = "Internal server error")
    )
)]
/// Create a patient record
///
/// The `PREFIX-YYYY-NNNN` identifier is allocated by the server.
#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PatientReq>,
) -> ApiResult<(StatusCode, Json<PatientRes>)> {
    let token = session_token(&headers)?;
    let record = blocking("Create patient error", move || {
        let actor = current_user(&state, token)?;
        state.patients.create(&actor, patient_details(req))
    })
    .await?;
    Ok((StatusCode::CREATED, Json(patient_res(record))))
}

#[utoipa::path(
    get,
    path = "/patients/stats",
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Dashboard figures", body = PatientStatsRes),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn patient_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PatientStatsRes>> {
    let token = session_token(&headers)?;
    let stats = blocking("Patient stats error", move || {
        current_user(&state, token)?;
        state.patients.stats()
    })
    .await?;
    Ok(Json(stats_res(stats)))
}

#[utoipa::path(
    get,
    path = "/patients/analytics",
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Distributions for the analytics charts", body = PatientAnalyticsRes),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
/// Patient distributions
///
/// Counts by status, cancer type, gender, stage and age group, plus diagnoses per month over
/// the last year.
#[axum::debug_handler]
pub async fn patient_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PatientAnalyticsRes>> {
    let token = session_token(&headers)?;
    let analytics = blocking("Patient analytics error", move || {
        current_user(&state, token)?;
        state.patients.analytics()
    })
    .await?;
    Ok(Json(analytics_res(analytics)))
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("patient_id" = String, Path, description = "Patient identifier, e.g. ONC-2025-0001")
    ),
    responses(
        (status = 200, description = "Patient record", body = PatientRes),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such patient"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(patient_id): AxumPath<String>,
) -> ApiResult<Json<PatientRes>> {
    let token = session_token(&headers)?;
    let record = blocking("Read patient error", move || {
        current_user(&state, token)?;
        state.patients.get(&patient_id)
    })
    .await?;
    Ok(Json(patient_res(record)))
}

#[utoipa::path(
    put,
    path = "/patients/{patient_id}",
    request_body = PatientReq,
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("patient_id" = String, Path, description = "Patient identifier")
    ),
    responses(
        (status = 200, description = "Patient updated", body = PatientRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Neither an administrator nor the record's creator"),
        (status = 404, description = "No such patient"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(patient_id): AxumPath<String>,
    Json(req): Json<PatientReq>,
) -> ApiResult<Json<PatientRes>> {
    let token = session_token(&headers)?;
    let record = blocking("Update patient error", move || {
        let actor = current_user(&state, token)?;
        state
            .patients
            .update(&actor, &patient_id, patient_details(req))
    })
    .await?;
    Ok(Json(patient_res(record)))
}

#[utoipa::path(
    delete,
    path = "/patients/{patient_id}",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("patient_id" = String, Path, description = "Patient identifier")
    ),
    responses(
        (status = 200, description = "Patient deleted", body = MessageRes),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Neither an administrator nor the record's creator"),
        (status = 404, description = "No such patient"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(patient_id): AxumPath<String>,
) -> ApiResult<Json<MessageRes>> {
    let token = session_token(&headers)?;
    let deleted = patient_id.clone();
    blocking("Delete patient error", move || {
        let actor = current_user(&state, token)?;
        state.patients.delete(&actor, &patient_id)
    })
    .await?;
    Ok(Json(MessageRes::new(format!("Patient {deleted} deleted"))))
}
