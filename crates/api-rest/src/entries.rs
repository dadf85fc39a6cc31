//! Data-entry ledger endpoints.
//!
//! Users see and change only their own entries; administrators see everyone's, with the
//! owner's username attached.

use axum::{
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};

use crate::convert::{entry_input, entry_res, summary_res};
use crate::error::ApiResult;
use crate::{blocking, current_user, session_token, AppState};
use api_shared::{EntryReq, EntryRes, ListEntriesRes, MessageRes};
use oncobloom_core::entries::EntrySummary;

#[utoipa::path(
    get,
    path = "/entries",
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Visible entries with totals", body = ListEntriesRes),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn list_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ListEntriesRes>> {
    let token = session_token(&headers)?;
    let entries = blocking("List entries error", move || {
        let actor = current_user(&state, token)?;
        state.entries.list(&actor)
    })
    .await?;

    let summary = EntrySummary::of(&entries);
    Ok(Json(ListEntriesRes {
        entries: entries.into_iter().map(entry_res).collect(),
        summary: summary_res(summary),
    }))
}

#[utoipa::path(
    post,
    path = "/entries",
    request_body = EntryReq,
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 201, description = "Entry created", body = EntryRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Not logged in"),
        (status = 409, description = "Identical entry already recorded"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn create_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EntryReq>,
) -> ApiResult<(StatusCode, Json<EntryRes>)> {
    let token = session_token(&headers)?;
    let entry = blocking("Create entry error", move || {
        let actor = current_user(&state, token)?;
        state.entries.create(&actor, entry_input(req)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(entry_res(entry))))
}

#[utoipa::path(
    get,
    path = "/entries/{id}",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("id" = i64, Path, description = "Entry id")
    ),
    responses(
        (status = 200, description = "Entry", body = EntryRes),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such entry visible to the caller"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn get_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<EntryRes>> {
    let token = session_token(&headers)?;
    let entry = blocking("Read entry error", move || {
        let actor = current_user(&state, token)?;
        state.entries.get(&actor, id)
    })
    .await?;
    Ok(Json(entry_res(entry)))
}

#[utoipa::path(
    put,
    path = "/entries/{id}",
    request_body = EntryReq,
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("id" = i64, Path, description = "Entry id")
    ),
    responses(
        (status = 200, description = "Entry updated", body = EntryRes),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such entry visible to the caller"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn update_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<EntryReq>,
) -> ApiResult<Json<EntryRes>> {
    let token = session_token(&headers)?;
    let entry = blocking("Update entry error", move || {
        let actor = current_user(&state, token)?;
        state.entries.update(&actor, id, entry_input(req)?)
    })
    .await?;
    Ok(Json(entry_res(entry)))
}

#[utoipa::path(
    delete,
    path = "/entries/{id}",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("id" = i64, Path, description = "Entry id")
    ),
    responses(
        (status = 200, description = "Entry deleted", body = MessageRes),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such entry visible to the caller"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<MessageRes>> {
    let token = session_token(&headers)?;
    blocking("Delete entry error", move || {
        let actor = current_user(&state, token)?;
        state.entries.delete(&actor, id)
    })
    .await?;
    Ok(Json(MessageRes::new("Entry deleted")))
}
