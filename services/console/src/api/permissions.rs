//! Permission tree API handlers.
//!
//! # Purpose
//! CRUD over permission nodes plus the nested tree view.
use crate::api::error::ApiError;
use crate::api::types::{
    ListResponse, PageQuery, PermissionListQuery, PermissionTreeQuery, StatusResponse,
};
use crate::app::AppState;
use crate::auth::middleware::Identity;
use crate::model::{Permission, PermissionTree};
use axum::Json;
use axum::extract::{Path, Query, State};

#[utoipa::path(
    get,
    path = "/api/v1/permissions",
    tag = "permissions",
    params(PageQuery, PermissionListQuery),
    responses((status = 200, description = "One page of permission nodes", body = ListResponse<Permission>))
)]
pub(crate) async fn list_permissions(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<PermissionListQuery>,
) -> Result<Json<ListResponse<Permission>>, ApiError> {
    let page = page.page();
    let result = state.permissions.query(&filter.to_query(), Some(page)).await?;
    Ok(Json(ListResponse::paged(result, page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/permissions.tree",
    tag = "permissions",
    params(PermissionTreeQuery),
    responses((status = 200, description = "Permission nodes nested as a tree", body = ListResponse<PermissionTree>))
)]
pub(crate) async fn permission_tree(
    State(state): State<AppState>,
    Query(query): Query<PermissionTreeQuery>,
) -> Result<Json<ListResponse<PermissionTree>>, ApiError> {
    let tree = state
        .permissions
        .query_tree(
            &query.to_query(),
            query.include_actions == Some(1),
            query.include_resources == Some(1),
        )
        .await?;
    Ok(Json(ListResponse::unpaged(tree)))
}

#[utoipa::path(
    get,
    path = "/api/v1/permissions/{id}",
    tag = "permissions",
    params(("id" = String, Path, description = "Permission record id")),
    responses(
        (status = 200, description = "Permission node with actions and resources", body = Permission),
        (status = 404, description = "Unknown id", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(state.permissions.get(&id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/permissions",
    tag = "permissions",
    request_body = Permission,
    responses(
        (status = 200, description = "Created node", body = Permission),
        (status = 400, description = "Duplicate name or invalid parent", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_permission(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<Permission>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(
        state.permissions.create(body, &identity.subject).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/permissions/{id}",
    tag = "permissions",
    params(("id" = String, Path, description = "Permission record id")),
    request_body = Permission,
    responses((status = 200, description = "Updated node", body = Permission))
)]
pub(crate) async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Permission>,
) -> Result<Json<Permission>, ApiError> {
    Ok(Json(state.permissions.update(&id, body).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/permissions/{id}",
    tag = "permissions",
    params(("id" = String, Path, description = "Permission record id")),
    responses(
        (status = 200, description = "Deleted", body = StatusResponse),
        (status = 400, description = "Node still has children", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.permissions.delete(&id).await?;
    Ok(Json(StatusResponse::ok()))
}
