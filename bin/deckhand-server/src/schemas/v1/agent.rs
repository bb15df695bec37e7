use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ClusterTarget {
    pub cluster: String,
    pub namespace: String,
}

/// Agents the server was started with.
#[derive(Debug, Serialize, ToSchema)]
pub struct AgentsResponse {
    pub clusters: Vec<ClusterTarget>,
    pub hosts: Vec<String>,
}
