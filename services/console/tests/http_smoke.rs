mod common;
mod http_helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    ROOT, ROOT_PASSWORD, granting_role, memory_state, read_json, state_with, test_config,
    users_permission,
};
use console::app::build_router;
use console::auth::rbac::{CasbinFactBase, FactBase};
use console::config::RunMode;
use console::model::{User, UserRole, UserStatus};
use http_helpers::{authed_json_request, authed_request, json_request};
use std::sync::Arc;
use tower::ServiceExt;

type App = axum::routing::RouterIntoService<Body, ()>;

async fn app() -> App {
    let (state, _) = memory_state().await;
    build_router(state).into_service()
}

async fn login(app: &App, user_name: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/pub/login",
            serde_json::json!({"user_name": user_name, "password": password}),
        ))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    body["access_token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn health_and_openapi_need_no_token() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).expect("req"))
        .await
        .expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "ok");

    let response = app
        .oneshot(Request::get("/openapi.json").body(Body::empty()).expect("req"))
        .await
        .expect("openapi");
    assert_eq!(response.status(), StatusCode::OK);
    let doc = read_json(response).await;
    assert!(doc["paths"]["/api/v1/roles"].is_object());
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/users").body(Body::empty()).expect("req"))
        .await
        .expect("users");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["error"]["code"], 9999);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/users", "not-a-jwt"))
        .await
        .expect("users");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/pub/login",
            serde_json::json!({"user_name": "ghost", "password": "x"}),
        ))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await["error"]["message"],
        "Invalid username"
    );
}

#[tokio::test]
async fn unknown_routes_are_not_found_not_unauthorized() {
    let app = app().await;
    let response = app
        .oneshot(Request::get("/api/v1/nope").body(Body::empty()).expect("req"))
        .await
        .expect("nope");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn root_builds_rbac_and_user_is_enforced() {
    let app = app().await;
    let root = login(&app, ROOT, ROOT_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/v1/permissions",
            &root,
            serde_json::json!({
                "name": "users",
                "actions": [{"code": "query", "name": "Query"}],
                "resources": [
                    {"code": "query", "name": "Query", "method": "GET", "path": "/api/v1/users"},
                    {"code": "detail", "name": "Detail", "method": "GET", "path": "/api/v1/users/:id"}
                ]
            }),
        ))
        .await
        .expect("permission");
    assert_eq!(response.status(), StatusCode::OK);
    let permission_id = read_json(response).await["record_id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/v1/roles",
            &root,
            serde_json::json!({
                "name": "viewer",
                "permissions": [{
                    "permission_id": permission_id,
                    "actions": ["query"],
                    "resources": ["query", "detail"]
                }]
            }),
        ))
        .await
        .expect("role");
    assert_eq!(response.status(), StatusCode::OK);
    let role_id = read_json(response).await["record_id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/v1/users",
            &root,
            serde_json::json!({
                "user_name": "erin",
                "real_name": "Erin",
                "password": "erin-pass",
                "status": 1,
                "roles": [{"role_id": role_id}]
            }),
        ))
        .await
        .expect("user");
    assert_eq!(response.status(), StatusCode::OK);
    let created = read_json(response).await;
    assert!(created.get("password").is_none());
    let user_id = created["record_id"].as_str().expect("id").to_string();

    let erin = login(&app, "erin", "erin-pass").await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/users?current=1&pageSize=10&realName=Eri",
            &erin,
        ))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let list = read_json(response).await;
    assert_eq!(list["pagination"]["total"], 1);
    assert_eq!(list["pagination"]["pageSize"], 10);
    assert_eq!(list["list"][0]["roles"][0]["name"], "viewer");

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/api/v1/users/{user_id}"),
            &erin,
        ))
        .await
        .expect("detail");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed_request("DELETE", "/api/v1/roles/whatever", &erin))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["error"]["code"], 401);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/pub/current/user", &erin))
        .await
        .expect("current");
    assert_eq!(response.status(), StatusCode::OK);
    let current = read_json(response).await;
    assert_eq!(current["user_name"], "erin");
    assert_eq!(current["role_names"][0], "viewer");

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/pub/current/permission.tree",
            &erin,
        ))
        .await
        .expect("tree");
    assert_eq!(response.status(), StatusCode::OK);
    let tree = read_json(response).await;
    assert_eq!(tree["list"][0]["name"], "users");

    let response = app
        .clone()
        .oneshot(authed_request(
            "PATCH",
            &format!("/api/v1/users/{user_id}/disable"),
            &root,
        ))
        .await
        .expect("disable");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/v1/users", &erin))
        .await
        .expect("list after disable");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["error"]["code"], 401);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/pub/login",
            serde_json::json!({"user_name": "erin", "password": "erin-pass"}),
        ))
        .await
        .expect("login disabled");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let app = app().await;
    let root = login(&app, ROOT, ROOT_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(authed_request("POST", "/api/v1/pub/login/exit", &root))
        .await
        .expect("logout");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authed_request("GET", "/api/v1/pub/current/user", &root))
        .await
        .expect("current");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["error"]["code"], 9999);
}

#[tokio::test]
async fn root_password_cannot_be_changed_and_refresh_issues_new_token() {
    let app = app().await;
    let root = login(&app, ROOT, ROOT_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "PUT",
            "/api/v1/pub/current/password",
            &root,
            serde_json::json!({"old_password": ROOT_PASSWORD, "new_password": "x"}),
        ))
        .await
        .expect("password");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(authed_request("POST", "/api/v1/pub/refresh-token", &root))
        .await
        .expect("refresh");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_json(response).await["access_token"].is_string());
}

#[tokio::test]
async fn validation_errors_surface_verbatim() {
    let app = app().await;
    let root = login(&app, ROOT, ROOT_PASSWORD).await;
    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/v1/roles",
            &root,
            serde_json::json!({"name": "dup"}),
        ))
        .await
        .expect("role");
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/v1/roles",
            &root,
            serde_json::json!({"name": "dup"}),
        ))
        .await
        .expect("role");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await["error"]["message"],
        "The role name already exists"
    );

    let response = app
        .oneshot(authed_request("GET", "/api/v1/permissions/missing", &root))
        .await
        .expect("missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["error"]["code"], 404);
}

#[tokio::test]
async fn debug_mode_serves_unauthenticated_requests_as_root() {
    let facts = Arc::new(CasbinFactBase::new(Some(ROOT.to_string())).await.expect("facts"));
    let mut config = test_config();
    config.run_mode = RunMode::Debug;
    let app = build_router(state_with(facts, &config)).into_service();

    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/roles.select").body(Body::empty()).expect("req"))
        .await
        .expect("roles");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/api/v1/pub/current/user").body(Body::empty()).expect("req"))
        .await
        .expect("current");
    assert_eq!(read_json(response).await["user_name"], ROOT);
}

#[tokio::test]
async fn editing_a_disabled_user_keeps_them_disabled() {
    let (state, facts) = memory_state().await;
    let app = build_router(state.clone()).into_service();
    let root = login(&app, ROOT, ROOT_PASSWORD).await;

    let permission = state
        .permissions
        .create(users_permission(), ROOT)
        .await
        .expect("permission");
    let role = state
        .roles
        .create(granting_role("viewer", &permission.record_id, &["query"]), ROOT)
        .await
        .expect("role");
    let user = state
        .users
        .create(
            User {
                user_name: "dana".to_string(),
                password: "dana-pass".to_string(),
                roles: vec![UserRole {
                    role_id: role.record_id.clone(),
                }],
                ..User::default()
            },
            ROOT,
        )
        .await
        .expect("user");
    state
        .users
        .update_status(&user.record_id, UserStatus::Disabled)
        .await
        .expect("disable");

    let uri = format!("/api/v1/users/{}", user.record_id);
    let response = app
        .clone()
        .oneshot(authed_json_request(
            "PUT",
            &uri,
            &root,
            serde_json::json!({
                "user_name": "dana",
                "real_name": "Dana",
                "roles": [{"role_id": role.record_id}]
            }),
        ))
        .await
        .expect("edit without status");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(authed_json_request(
            "PUT",
            &uri,
            &root,
            serde_json::json!({
                "user_name": "dana",
                "real_name": "Dana",
                "status": 2,
                "roles": [{"role_id": role.record_id}]
            }),
        ))
        .await
        .expect("edit");
    assert_eq!(response.status(), StatusCode::OK);

    let stored = state.users.get(&user.record_id).await.expect("get");
    assert_eq!(stored.status, UserStatus::Disabled);
    assert_eq!(stored.real_name, "Dana");
    assert!(
        !facts
            .enforce(&user.record_id, "/api/v1/users", "GET")
            .await
            .expect("enforce")
    );
}
