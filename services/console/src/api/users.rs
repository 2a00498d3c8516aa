//! User API handlers.
//!
//! # Security considerations
//! Passwords are accepted on create/update and never serialized back.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{ListResponse, PageQuery, StatusResponse, UserListQuery};
use crate::app::AppState;
use crate::auth::middleware::Identity;
use crate::model::{User, UserShow, UserStatus};
use axum::Json;
use axum::extract::{Path, Query, State};

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(PageQuery, UserListQuery),
    responses((status = 200, description = "One page of users with their roles", body = ListResponse<UserShow>))
)]
pub(crate) async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<UserListQuery>,
) -> Result<Json<ListResponse<UserShow>>, ApiError> {
    let query = filter
        .to_query()
        .map_err(|message| api_validation_error(&message))?;
    let page = page.page();
    let result = state.users.query(&query, Some(page)).await?;
    Ok(Json(ListResponse::paged(result, page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User record id")),
    responses((status = 200, description = "User with role assignments", body = User))
)]
pub(crate) async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.get(&id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = User,
    responses((status = 200, description = "Created user", body = User))
)]
pub(crate) async fn create_user(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<User>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.create(body, &identity.subject).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User record id")),
    request_body = User,
    responses((status = 200, description = "Updated user", body = User))
)]
pub(crate) async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<User>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.update(&id, body).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User record id")),
    responses((status = 200, description = "Deleted", body = StatusResponse))
)]
pub(crate) async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.users.delete(&id).await?;
    Ok(Json(StatusResponse::ok()))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}/enable",
    tag = "users",
    params(("id" = String, Path, description = "User record id")),
    responses((status = 200, description = "Enabled", body = StatusResponse))
)]
pub(crate) async fn enable_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.users.update_status(&id, UserStatus::Enabled).await?;
    Ok(Json(StatusResponse::ok()))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}/disable",
    tag = "users",
    params(("id" = String, Path, description = "User record id")),
    responses((status = 200, description = "Disabled; grouping facts purged", body = StatusResponse))
)]
pub(crate) async fn disable_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.users.update_status(&id, UserStatus::Disabled).await?;
    Ok(Json(StatusResponse::ok()))
}
