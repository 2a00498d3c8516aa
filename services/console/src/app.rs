//! Console HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application context injected into handlers.
//!
//! # Notes
//! `AppState` is the only place components are wired together; nothing is
//! looked up from process globals.
use crate::api;
use crate::auth::middleware::{self, Authorizer};
use crate::auth::rbac::{FactBase, PolicyAdapter};
use crate::auth::token::JwtAuth;
use crate::config::ConsoleConfig;
use crate::manager::{LoginManager, PermissionManager, RoleManager, UserManager};
use crate::store::ConsoleStore;
use axum::Router;
use axum::routing::{get, patch, post, put};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConsoleStore>,
    pub policy: PolicyAdapter,
    pub authorizer: Authorizer,
    pub permissions: PermissionManager,
    pub roles: RoleManager,
    pub users: UserManager,
    pub login: LoginManager,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ConsoleStore>,
        facts: Arc<dyn FactBase>,
        config: &ConsoleConfig,
    ) -> Self {
        let tokens = Arc::new(JwtAuth::new(&config.jwt.signing_key, config.jwt.expired));
        let policy = PolicyAdapter::new(store.clone(), facts.clone());
        let sync = Arc::new(policy.clone());
        let strict = config.policy.strict_sync;
        let authorizer = Authorizer::new(
            tokens.clone(),
            facts,
            config.auth.clone(),
            config.run_mode,
            config.policy.enforce,
            config.root.user_name.clone(),
        );
        Self {
            permissions: PermissionManager::new(store.clone(), sync.clone(), strict),
            roles: RoleManager::new(store.clone(), sync.clone(), strict),
            users: UserManager::new(store.clone(), sync, config.root.user_name.clone(), strict),
            login: LoginManager::new(store.clone(), tokens, config.root.clone()),
            authorizer,
            policy,
            store,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    let protected = Router::new()
        .route("/api/v1/pub/login", post(api::login::login))
        .route("/api/v1/pub/login/exit", post(api::login::logout))
        .route("/api/v1/pub/refresh-token", post(api::login::refresh_token))
        .route("/api/v1/pub/current/user", get(api::login::current_user))
        .route(
            "/api/v1/pub/current/permission.tree",
            get(api::login::current_permission_tree),
        )
        .route(
            "/api/v1/pub/current/password",
            put(api::login::update_password),
        )
        .route(
            "/api/v1/permissions",
            get(api::permissions::list_permissions).post(api::permissions::create_permission),
        )
        .route(
            "/api/v1/permissions.tree",
            get(api::permissions::permission_tree),
        )
        .route(
            "/api/v1/permissions/:id",
            get(api::permissions::get_permission)
                .put(api::permissions::update_permission)
                .delete(api::permissions::delete_permission),
        )
        .route(
            "/api/v1/roles",
            get(api::roles::list_roles).post(api::roles::create_role),
        )
        .route("/api/v1/roles.select", get(api::roles::select_roles))
        .route(
            "/api/v1/roles/:id",
            get(api::roles::get_role)
                .put(api::roles::update_role)
                .delete(api::roles::delete_role),
        )
        .route(
            "/api/v1/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/api/v1/users/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route("/api/v1/users/:id/enable", patch(api::users::enable_user))
        .route("/api/v1/users/:id/disable", patch(api::users::disable_user))
        // route_layer: unmatched paths still 404 instead of 401.
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authorize,
        ));

    Router::new()
        .route("/health", get(api::system::health))
        .route("/openapi.json", get(api::openapi::openapi_json))
        .merge(protected)
        .layer(CatchPanicLayer::new())
        .layer(trace_layer)
        .with_state(state)
}
