use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::schemas::v1::agent::{AgentsResponse, ClusterTarget};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_agents), components(schemas(AgentsResponse, ClusterTarget)))]
pub struct AgentsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/agents", get(list_agents))
}

/// Cluster and host agents loaded from the agents file.
#[utoipa::path(
    get,
    path = "/v1/agents",
    tag = "agents",
    responses(
        (status = 200, description = "Registered agents", body = AgentsResponse),
    )
)]
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<AgentsResponse> {
    let agents = state.orchestrator.agents();
    Json(AgentsResponse {
        clusters: agents
            .cluster_targets()
            .into_iter()
            .map(|(cluster, namespace)| ClusterTarget { cluster, namespace })
            .collect(),
        hosts: agents.host_targets(),
    })
}
