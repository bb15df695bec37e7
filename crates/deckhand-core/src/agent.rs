//! Remote agent capabilities and the registry that resolves them.
//!
//! A cluster agent is registered per `(cluster, namespace)` and manipulates
//! workloads there; a host agent is registered per VM host identity and
//! installs artifacts and runs health checks on that host. How the calls travel
//! is up to the implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Readiness of one pod, as reported by a cluster agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    pub name: String,
    /// `"True"`, `"False"` or `"Unknown"`.
    pub ready: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchImageRequest {
    pub namespace: String,
    pub workload_name: String,
    pub container: String,
    pub image: String,
}

/// Parameters for installing an artifact on a host and starting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAndStartRequest {
    pub artifact_url: String,
    pub artifact_headers: HashMap<String, String>,
    pub deploy_path: String,
    pub deploy_user: String,
    pub pre_command: String,
    pub start_command: String,
}

/// A health check executed by a host agent on its own host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// `http`, `shell`, `tcp` or `none`.
    #[serde(rename = "type", default)]
    pub check_type: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub shell: String,
}

#[async_trait]
pub trait ClusterAgent: Send + Sync {
    async fn patch_image(&self, request: &PatchImageRequest) -> Result<(), AgentError>;

    async fn trigger_rollout(&self, namespace: &str, workload_name: &str) -> Result<(), AgentError>;

    async fn pod_status(
        &self,
        namespace: &str,
        workload_name: &str,
    ) -> Result<Vec<PodStatus>, AgentError>;
}

#[async_trait]
pub trait HostAgent: Send + Sync {
    /// Returns the combined output of the start command.
    async fn push_and_start(&self, request: &PushAndStartRequest) -> Result<String, AgentError>;

    /// Returns the check's output on success.
    async fn health_check(&self, check: &HealthCheck) -> Result<String, AgentError>;
}

/// Agents known to the orchestrator, built once at startup and only read
/// afterwards.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    clusters: HashMap<(String, String), Arc<dyn ClusterAgent>>,
    hosts: HashMap<String, Arc<dyn HostAgent>>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("clusters", &self.clusters.len())
            .field("hosts", &self.hosts.len())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_cluster(
        &mut self,
        cluster: impl Into<String>,
        namespace: impl Into<String>,
        agent: Arc<dyn ClusterAgent>,
    ) {
        self.clusters.insert((cluster.into(), namespace.into()), agent);
    }

    pub fn register_host(&mut self, host: impl Into<String>, agent: Arc<dyn HostAgent>) {
        self.hosts.insert(host.into(), agent);
    }

    pub fn resolve_cluster(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<Arc<dyn ClusterAgent>, AgentError> {
        self.clusters
            .get(&(cluster.to_owned(), namespace.to_owned()))
            .cloned()
            .ok_or_else(|| AgentError::NotFound {
                key: format!("cluster={cluster} namespace={namespace}"),
            })
    }

    pub fn resolve_host(&self, host: &str) -> Result<Arc<dyn HostAgent>, AgentError> {
        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| AgentError::NotFound { key: format!("host={host}") })
    }

    /// Registered `(cluster, namespace)` pairs, sorted.
    pub fn cluster_targets(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.clusters.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Registered host identities, sorted.
    pub fn host_targets(&self) -> Vec<String> {
        let mut hosts: Vec<_> = self.hosts.keys().cloned().collect();
        hosts.sort();
        hosts
    }
}
