//! Session, account and password-reset endpoints.
//!
//! Every flow here is tied to the session named by the `x-session-token` header. A client
//! starts with `POST /sessions` (or `POST /auth/login`, which always hands out a fresh token)
//! and sends the token back on every later call.

use axum::{extract::State, http::HeaderMap, http::StatusCode, response::Json};

use crate::convert::user_res;
use crate::error::ApiResult;
use crate::{blocking, current_user, session_token, AppState};
use api_shared::{
    ChangePasswordReq, ForgotPasswordReq, ForgotPasswordRes, LoginReq, LoginRes, MessageRes,
    RegisterReq, ResetPasswordReq, SessionRes, UserRes, VerifyOtpReq,
};
use oncobloom_core::users::Registration;
use oncobloom_core::CoreError;

#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Anonymous session started", body = SessionRes)
    )
)]
/// Start an anonymous session
///
/// Anonymous sessions can register, request a password reset and then log in.
#[axum::debug_handler]
pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionRes>) {
    let token = state.sessions.create();
    (
        StatusCode::CREATED,
        Json(SessionRes {
            token: token.to_string(),
        }),
    )
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = UserRes),
        (status = 400, description = "Invalid registration"),
        (status = 409, description = "Username or e-mail already taken"),
        (status = 500, description = "Internal server error")
    )
)]
/// Register a new (non-admin) account
///
/// Registration does not log the account in.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> ApiResult<(StatusCode, Json<UserRes>)> {
    let user = blocking("Register error", move || {
        state.users.register(&Registration {
            username: &req.username,
            email: &req.email,
            full_name: req.full_name.as_deref(),
            password: &req.password,
            confirm_password: &req.confirm_password,
        })
    })
    .await?;
    Ok((StatusCode::CREATED, Json(user_res(&user))))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in; use the returned token from now on", body = LoginRes),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
/// Log in by username or e-mail address
///
/// A new session is created for the logged-in user. If the request carried a session token,
/// that session is ended.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginReq>,
) -> ApiResult<Json<LoginRes>> {
    let previous = session_token(&headers).ok();
    let (user, token) = blocking("Login error", move || {
        let user = state.users.authenticate(&req.identity, &req.password)?;
        if let Some(previous) = previous {
            state.sessions.remove(previous);
        }
        let token = state.sessions.create();
        let session_user = user.session_user();
        state.sessions.with_session(token, move |session| {
            session.user = Some(session_user);
            Ok(())
        })?;
        Ok((user, token))
    })
    .await?;

    tracing::info!("user {} logged in", user.username);
    Ok(Json(LoginRes {
        token: token.to_string(),
        user: user_res(&user),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Session ended", body = MessageRes),
        (status = 401, description = "Missing or unknown session")
    )
)]
#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<MessageRes>> {
    let token = session_token(&headers)?;
    blocking("Logout error", move || {
        if state.sessions.remove(token) {
            Ok(())
        } else {
            Err(CoreError::Unauthenticated)
        }
    })
    .await?;
    Ok(Json(MessageRes::new("Logged out")))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "The logged-in account", body = UserRes),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<UserRes>> {
    let token = session_token(&headers)?;
    let user = blocking("Current user error", move || {
        let actor = current_user(&state, token)?;
        state.users.get(actor.id)
    })
    .await?;
    Ok(Json(user_res(&user)))
}

#[utoipa::path(
    post,
    path = "/auth/forgot",
    request_body = ForgotPasswordReq,
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Reset code issued", body = ForgotPasswordRes),
        (status = 401, description = "Missing or unknown session"),
        (status = 404, description = "No account matches"),
        (status = 500, description = "Internal server error")
    )
)]
/// Issue a password-reset code
///
/// The code is sent to the account's e-mail address and is bound to this session. Requesting
/// again replaces the earlier code.
#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ForgotPasswordReq>,
) -> ApiResult<Json<ForgotPasswordRes>> {
    let token = session_token(&headers)?;
    let requested = blocking("Forgot password error", move || {
        state
            .sessions
            .with_session(token, |session| state.resets.request(session, &req.identity))
    })
    .await?;

    let message = if requested.code_delivered {
        "A one-time code has been sent to the account's e-mail address"
    } else {
        "A one-time code was issued but could not be delivered"
    };
    Ok(Json(ForgotPasswordRes {
        code_delivered: requested.code_delivered,
        expires_at: requested.expires_at.to_rfc3339(),
        message: message.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/otp",
    request_body = VerifyOtpReq,
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Code accepted", body = MessageRes),
        (status = 400, description = "Wrong code or no code pending"),
        (status = 401, description = "Missing or unknown session"),
        (status = 410, description = "Code expired")
    )
)]
/// Verify a password-reset code
///
/// A wrong code can be retried while the code is still valid.
#[axum::debug_handler]
pub async fn verify_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyOtpReq>,
) -> ApiResult<Json<MessageRes>> {
    let token = session_token(&headers)?;
    blocking("Verify OTP error", move || {
        state
            .sessions
            .with_session(token, |session| state.resets.verify(session, &req.code))
    })
    .await?;
    Ok(Json(MessageRes::new("Code verified, choose a new password")))
}

#[utoipa::path(
    post,
    path = "/auth/reset",
    request_body = ResetPasswordReq,
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Password replaced", body = MessageRes),
        (status = 400, description = "Password rejected"),
        (status = 401, description = "No verified code in this session"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResetPasswordReq>,
) -> ApiResult<Json<MessageRes>> {
    let token = session_token(&headers)?;
    blocking("Reset password error", move || {
        state.sessions.with_session(token, |session| {
            state
                .resets
                .complete(session, &req.password, &req.confirm_password)
        })
    })
    .await?;
    Ok(Json(MessageRes::new("Password updated, please log in")))
}

#[utoipa::path(
    post,
    path = "/auth/password",
    request_body = ChangePasswordReq,
    params(("x-session-token" = String, Header, description = "Session token")),
    responses(
        (status = 200, description = "Password changed", body = MessageRes),
        (status = 400, description = "New password rejected"),
        (status = 401, description = "Not logged in or wrong current password"),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordReq>,
) -> ApiResult<Json<MessageRes>> {
    let token = session_token(&headers)?;
    blocking("Change password error", move || {
        let actor = current_user(&state, token)?;
        state.users.change_password(
            &actor,
            &req.current_password,
            &req.new_password,
            &req.confirm_password,
        )
    })
    .await?;
    Ok(Json(MessageRes::new("Password changed")))
}
