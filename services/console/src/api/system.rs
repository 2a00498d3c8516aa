//! Health API handler.
//!
//! # Key invariants and assumptions
//! - Health checks must be fast and side-effect free.
//! - The route sits outside the authorization middleware so probes need no token.
use crate::api::error::ApiError;
use crate::api::types::HealthStatus;
use crate::app::AppState;
use crate::manager::ManagerError;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Console health", body = HealthStatus),
        (status = 500, description = "Store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    // Probe the backing store so readiness reflects the dependency.
    state
        .store
        .health_check()
        .await
        .map_err(ManagerError::Internal)?;
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
    }))
}
