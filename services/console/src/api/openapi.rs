//! OpenAPI schema aggregation for the console API.
//!
//! # Purpose
//! Collects all routes and schema types into a single OpenAPI document,
//! served as JSON at `/openapi.json`.
use crate::api::types::{
    ErrorItem, ErrorResponse, HealthStatus, LoginRequest, Pagination, StatusResponse,
    UpdatePasswordRequest,
};
use crate::api::{login, permissions, roles, system, users};
use crate::auth::token::TokenInfo;
use crate::manager::login::LoginInfo;
use crate::model::{
    Permission, PermissionAction, PermissionResource, PermissionTree, Role, RolePermission, User,
    UserRole, UserShow,
};
use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "console",
        version = "v1",
        description = "Admin console RBAC API"
    ),
    paths(
        system::health,
        login::login,
        login::logout,
        login::refresh_token,
        login::current_user,
        login::current_permission_tree,
        login::update_password,
        permissions::list_permissions,
        permissions::permission_tree,
        permissions::get_permission,
        permissions::create_permission,
        permissions::update_permission,
        permissions::delete_permission,
        roles::list_roles,
        roles::select_roles,
        roles::get_role,
        roles::create_role,
        roles::update_role,
        roles::delete_role,
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::enable_user,
        users::disable_user
    ),
    components(schemas(
        HealthStatus,
        ErrorItem,
        ErrorResponse,
        StatusResponse,
        Pagination,
        LoginRequest,
        UpdatePasswordRequest,
        TokenInfo,
        LoginInfo,
        Permission,
        PermissionAction,
        PermissionResource,
        PermissionTree,
        Role,
        RolePermission,
        User,
        UserRole,
        UserShow
    )),
    tags(
        (name = "system", description = "Health"),
        (name = "login", description = "Login, tokens, and the current user"),
        (name = "permissions", description = "Permission tree management"),
        (name = "roles", description = "Role management"),
        (name = "users", description = "User management")
    )
)]
pub struct ApiDoc;

pub(crate) async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
