//! Role API handlers.
use crate::api::error::ApiError;
use crate::api::types::{ListResponse, PageQuery, RoleListQuery, StatusResponse};
use crate::app::AppState;
use crate::auth::middleware::Identity;
use crate::model::Role;
use axum::Json;
use axum::extract::{Path, Query, State};

#[utoipa::path(
    get,
    path = "/api/v1/roles",
    tag = "roles",
    params(PageQuery, RoleListQuery),
    responses((status = 200, description = "One page of roles", body = ListResponse<Role>))
)]
pub(crate) async fn list_roles(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<RoleListQuery>,
) -> Result<Json<ListResponse<Role>>, ApiError> {
    let page = page.page();
    let result = state.roles.query(&filter.to_query(), Some(page)).await?;
    Ok(Json(ListResponse::paged(result, page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/roles.select",
    tag = "roles",
    params(RoleListQuery),
    responses((status = 200, description = "All roles, without grants", body = ListResponse<Role>))
)]
pub(crate) async fn select_roles(
    State(state): State<AppState>,
    Query(filter): Query<RoleListQuery>,
) -> Result<Json<ListResponse<Role>>, ApiError> {
    let roles = state.roles.select(&filter.to_query()).await?;
    Ok(Json(ListResponse::unpaged(roles)))
}

#[utoipa::path(
    get,
    path = "/api/v1/roles/{id}",
    tag = "roles",
    params(("id" = String, Path, description = "Role record id")),
    responses((status = 200, description = "Role with its grants", body = Role))
)]
pub(crate) async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(state.roles.get(&id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/roles",
    tag = "roles",
    request_body = Role,
    responses((status = 200, description = "Created role", body = Role))
)]
pub(crate) async fn create_role(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<Role>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(state.roles.create(body, &identity.subject).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/roles/{id}",
    tag = "roles",
    params(("id" = String, Path, description = "Role record id")),
    request_body = Role,
    responses((status = 200, description = "Updated role", body = Role))
)]
pub(crate) async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Role>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(state.roles.update(&id, body).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/roles/{id}",
    tag = "roles",
    params(("id" = String, Path, description = "Role record id")),
    responses(
        (status = 200, description = "Deleted", body = StatusResponse),
        (status = 400, description = "Role is assigned to a user", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.roles.delete(&id).await?;
    Ok(Json(StatusResponse::ok()))
}
