//! Remote agents: the TOML file that lists them and the HTTP client that
//! talks to them.
//!
//! ```toml
//! [[cluster]]
//! cluster = "prod"
//! namespace = "web"
//! endpoint = "http://10.0.0.1:5117"
//!
//! [[host]]
//! host = "10.0.0.9"
//! endpoint = "http://10.0.0.9:5117"
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use deckhand_core::agent::{
    AgentRegistry, ClusterAgent, HealthCheck, HostAgent, PatchImageRequest, PodStatus,
    PushAndStartRequest,
};
use deckhand_core::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgentsFile {
    #[serde(default)]
    pub cluster: Vec<ClusterEntry>,
    #[serde(default)]
    pub host: Vec<HostEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterEntry {
    pub cluster: String,
    pub namespace: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostEntry {
    pub host: String,
    pub endpoint: String,
}

impl AgentsFile {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read the agents file. A missing file is not an error: the server can
    /// still serve history and HTTP applications without agents.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Self::parse(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "agents file not found; starting with no agents");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn into_registry(self, client: reqwest::Client) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for entry in self.cluster {
            info!(
                cluster = %entry.cluster,
                namespace = %entry.namespace,
                endpoint = %entry.endpoint,
                "cluster agent registered"
            );
            registry.register_cluster(
                entry.cluster,
                entry.namespace,
                Arc::new(HttpAgent::new(client.clone(), entry.endpoint)),
            );
        }
        for entry in self.host {
            info!(host = %entry.host, endpoint = %entry.endpoint, "host agent registered");
            let agent = Arc::new(HttpAgent::new(client.clone(), entry.endpoint));
            registry.register_host(entry.host, agent);
        }
        registry
    }
}

#[derive(Debug, Deserialize)]
struct PodsResponse {
    #[serde(default)]
    pods: Vec<PodStatus>,
}

#[derive(Debug, Deserialize)]
struct OutputResponse {
    #[serde(default)]
    output: String,
}

/// JSON-over-HTTP client for one agent endpoint. Serves as both a cluster and
/// a host agent; which role it plays depends on where it is registered.
#[derive(Debug, Clone)]
pub struct HttpAgent {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAgent {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }

    /// POST `body` to `path` and return the response text.
    async fn call<B>(&self, path: &str, body: &B) -> Result<String, AgentError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.endpoint.trim_end_matches('/'), path);
        debug!(url = %url, "calling agent");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(AgentError::Remote(if text.is_empty() {
                format!("agent returned {status}")
            } else {
                text
            }));
        }
        Ok(text)
    }

    async fn call_for_output<B>(&self, path: &str, body: &B) -> Result<String, AgentError>
    where
        B: Serialize + ?Sized,
    {
        let text = self.call(path, body).await?;
        Ok(serde_json::from_str::<OutputResponse>(&text)
            .map(|r| r.output)
            .unwrap_or(text))
    }
}

#[async_trait]
impl ClusterAgent for HttpAgent {
    async fn patch_image(&self, request: &PatchImageRequest) -> Result<(), AgentError> {
        self.call("/agent/v1/workloads/image", request).await?;
        Ok(())
    }

    async fn trigger_rollout(
        &self,
        namespace: &str,
        workload_name: &str,
    ) -> Result<(), AgentError> {
        self.call(
            "/agent/v1/workloads/rollout",
            &json!({ "namespace": namespace, "workload_name": workload_name }),
        )
        .await?;
        Ok(())
    }

    async fn pod_status(
        &self,
        namespace: &str,
        workload_name: &str,
    ) -> Result<Vec<PodStatus>, AgentError> {
        let text = self
            .call(
                "/agent/v1/workloads/pods",
                &json!({ "namespace": namespace, "workload_name": workload_name }),
            )
            .await?;
        serde_json::from_str::<PodsResponse>(&text)
            .map(|r| r.pods)
            .map_err(|e| AgentError::Remote(format!("malformed pod status: {e}")))
    }
}

#[async_trait]
impl HostAgent for HttpAgent {
    async fn push_and_start(&self, request: &PushAndStartRequest) -> Result<String, AgentError> {
        self.call_for_output("/agent/v1/vm/deploy", request).await
    }

    async fn health_check(&self, check: &HealthCheck) -> Result<String, AgentError> {
        self.call_for_output("/agent/v1/vm/healthcheck", check).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
