//! Account administration. Administrator sessions only.

use axum::{
    extract::{Path as AxumPath, State},
    http::HeaderMap,
    response::Json,
};

use crate::convert::{overview_res, user_res};
use crate::error::ApiResult;
use crate::{blocking, session_token, AppState};
use api_shared::{ListUsersRes, MessageRes, UserRes};
use oncobloom_core::{CoreResult, SessionUser};
use uuid::Uuid;

fn current_admin(state: &AppState, token: Uuid) -> CoreResult<SessionUser> {
    state
        .sessions
        .with_session(token, |session| session.require_admin().cloned())
}

#[utoipa::path(
    get,
    path = "/admin/users",
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "All accounts, newest first, with patient counts and totals", body = ListUsersRes),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not an administrator"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ListUsersRes>> {
    let token = session_token(&headers)?;
    let overview = blocking("List users error", move || {
        current_admin(&state, token)?;
        state.users.overview()
    })
    .await?;
    Ok(Json(overview_res(overview)))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/promote",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User is now an administrator", body = UserRes),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "No such user"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn promote_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<UserRes>> {
    let token = session_token(&headers)?;
    let user = blocking("Promote user error", move || {
        let actor = current_admin(&state, token)?;
        state.users.promote(&actor, id)
    })
    .await?;
    Ok(Json(user_res(&user)))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/demote",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Administrator rights removed", body = UserRes),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not an administrator, or demoting yourself"),
        (status = 404, description = "No such user"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn demote_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<UserRes>> {
    let token = session_token(&headers)?;
    let user = blocking("Demote user error", move || {
        let actor = current_admin(&state, token)?;
        state.users.demote(&actor, id)
    })
    .await?;
    Ok(Json(user_res(&user)))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(
        ("x-session-token" = String, Header, description = "Session token"),
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User and their entries deleted", body = MessageRes),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not an administrator, or deleting yourself"),
        (status = 404, description = "No such user"),
        (status = 500, description = "Internal server error")
    )
)]
/// Delete an account
///
/// The account's ledger entries go with it. Patient records it created are kept.
#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<MessageRes>> {
    let token = session_token(&headers)?;
    blocking("Delete user error", move || {
        let actor = current_admin(&state, token)?;
        state.users.delete(&actor, id)
    })
    .await?;
    Ok(Json(MessageRes::new("User deleted")))
}
