#![allow(dead_code)]

use console::app::AppState;
use console::auth::rbac::{CasbinFactBase, FactBase};
use console::config::{ConsoleConfig, RunMode};
use console::model::{Permission, PermissionAction, PermissionResource, Role, RolePermission};
use console::store::ConsoleStore;
use console::store::memory::InMemoryStore;
use std::sync::Arc;

pub const ROOT: &str = "root";
pub const ROOT_PASSWORD: &str = "root-password";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn test_config() -> ConsoleConfig {
    let mut config = ConsoleConfig {
        run_mode: RunMode::Release,
        ..ConsoleConfig::default()
    };
    config.root.user_name = ROOT.to_string();
    config.root.password = ROOT_PASSWORD.to_string();
    config.jwt.signing_key = "integration-secret".to_string();
    config
}

/// Application context over a fresh memory store and a casbin fact base.
pub async fn memory_state() -> (AppState, Arc<CasbinFactBase>) {
    let facts = Arc::new(
        CasbinFactBase::new(Some(ROOT.to_string()))
            .await
            .expect("facts"),
    );
    let state = state_with(facts.clone(), &test_config());
    (state, facts)
}

pub fn state_with(facts: Arc<dyn FactBase>, config: &ConsoleConfig) -> AppState {
    let store: Arc<dyn ConsoleStore> = Arc::new(InMemoryStore::new());
    AppState::new(store, facts, config)
}

pub fn resource(code: &str, method: &str, path: &str) -> PermissionResource {
    PermissionResource {
        code: code.to_string(),
        name: code.to_string(),
        method: method.to_string(),
        path: path.to_string(),
    }
}

/// The `users` permission node: query (GET) and add (POST) on `/api/v1/users`.
pub fn users_permission() -> Permission {
    Permission {
        name: "users".to_string(),
        actions: vec![
            PermissionAction {
                code: "query".to_string(),
                name: "Query".to_string(),
            },
            PermissionAction {
                code: "add".to_string(),
                name: "Add".to_string(),
            },
        ],
        resources: vec![
            resource("query", "GET", "/api/v1/users"),
            resource("add", "POST", "/api/v1/users"),
        ],
        ..Permission::default()
    }
}

pub fn granting_role(name: &str, permission_id: &str, codes: &[&str]) -> Role {
    Role {
        name: name.to_string(),
        permissions: vec![RolePermission {
            permission_id: permission_id.to_string(),
            actions: codes.iter().map(|code| code.to_string()).collect(),
            resources: codes.iter().map(|code| code.to_string()).collect(),
        }],
        ..Role::default()
    }
}
