//! Login, session, and current-user handlers.
//!
//! # Purpose
//! Everything under `/api/v1/pub`: credential login, logout, token refresh,
//! and the signed-in user's profile, menu tree, and password.
//!
//! # Security considerations
//! - These routes skip enforcement but, except for login itself, still need
//!   a resolved identity.
//! - Login failures log the user name, never the password.
use crate::api::error::ApiError;
use crate::api::types::{ListResponse, LoginRequest, StatusResponse, UpdatePasswordRequest};
use crate::app::AppState;
use crate::auth::middleware::{Identity, bearer_token};
use crate::auth::token::TokenInfo;
use crate::manager::login::LoginInfo;
use crate::model::PermissionTree;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

#[utoipa::path(
    post,
    path = "/api/v1/pub/login",
    tag = "login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token", body = TokenInfo),
        (status = 400, description = "Bad credentials or disabled user", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenInfo>, ApiError> {
    let subject = match state.login.verify(&body.user_name, &body.password).await {
        Ok(subject) => subject,
        Err(err) => {
            tracing::info!(user_name = %body.user_name, error = %err, "login rejected");
            return Err(err.into());
        }
    };
    let token = state.login.generate_token(&subject)?;
    tracing::info!(user_name = %body.user_name, subject = %subject, "login succeeded");
    Ok(Json(token))
}

#[utoipa::path(
    post,
    path = "/api/v1/pub/login/exit",
    tag = "login",
    responses((status = 200, description = "Token revoked", body = StatusResponse))
)]
/// Revoke the presented bearer token. A request without one is a no-op.
pub(crate) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.login.destroy_token(token)?;
    }
    Ok(Json(StatusResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/api/v1/pub/refresh-token",
    tag = "login",
    responses((status = 200, description = "Fresh access token", body = TokenInfo))
)]
pub(crate) async fn refresh_token(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<TokenInfo>, ApiError> {
    Ok(Json(state.login.refresh(&identity.subject).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/pub/current/user",
    tag = "login",
    responses((status = 200, description = "Signed-in user", body = LoginInfo))
)]
pub(crate) async fn current_user(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<LoginInfo>, ApiError> {
    Ok(Json(state.login.get_login_info(&identity.subject).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/pub/current/permission.tree",
    tag = "login",
    responses(
        (status = 200, description = "Menu tree visible to the signed-in user", body = ListResponse<PermissionTree>),
        (status = 401, description = "No roles or no permissions", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn current_permission_tree(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ListResponse<PermissionTree>>, ApiError> {
    let tree = state
        .login
        .query_user_permission_tree(&identity.subject)
        .await?;
    Ok(Json(ListResponse::unpaged(tree)))
}

#[utoipa::path(
    put,
    path = "/api/v1/pub/current/password",
    tag = "login",
    request_body = UpdatePasswordRequest,
    responses((status = 200, description = "Password changed", body = StatusResponse))
)]
pub(crate) async fn update_password(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<UpdatePasswordRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .login
        .update_password(&identity.subject, &body.old_password, &body.new_password)
        .await?;
    Ok(Json(StatusResponse::ok()))
}
