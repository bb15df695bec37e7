//! Health endpoint: database reachability and the loaded agent registry.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Reports the version, whether the task database answers, and how many
/// cluster and VM-host agents were loaded. Answers 503 with `"status":
/// "degraded"` when the database does not respond.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server and database are up", body = Value),
        (status = 503, description = "Task database unreachable", body = Value)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let database = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "health check: database unreachable");
            "unreachable"
        }
    };
    let agents = state.orchestrator.agents();
    let code = if database == "ok" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
        "status":   if code == StatusCode::OK { "ok" } else { "degraded" },
        "version":  env!("CARGO_PKG_VERSION"),
        "database": database,
        "agents": {
            "clusters": agents.cluster_targets().len(),
            "hosts":    agents.host_targets().len(),
        },
    });
    (code, Json(body))
}
