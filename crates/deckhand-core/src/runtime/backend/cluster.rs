use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{AgentRegistry, PatchImageRequest};
use crate::error::BackendError;
use crate::model::{TaskType, WorkloadDescriptor};
use crate::runtime::backend::{DeployBackend, ProbeReport};

/// Rolls out container workloads through the agent registered for the
/// workload's cluster and namespace.
#[derive(Debug, Clone)]
pub struct ClusterBackend {
    agents: Arc<AgentRegistry>,
    task_type: TaskType,
}

impl ClusterBackend {
    pub fn new(agents: Arc<AgentRegistry>, task_type: TaskType) -> Self {
        Self { agents, task_type }
    }
}

impl DeployBackend for ClusterBackend {
    type Receipt = ();

    async fn dispatch(&self, workload: &WorkloadDescriptor) -> Result<(), BackendError> {
        let agent = self
            .agents
            .resolve_cluster(&workload.cluster, &workload.namespace)?;

        match &self.task_type {
            TaskType::DeployImage => {
                agent
                    .patch_image(&PatchImageRequest {
                        namespace: workload.namespace.clone(),
                        workload_name: workload.workload_name.clone(),
                        container: workload.container_name.clone(),
                        image: workload.artifact_url.clone(),
                    })
                    .await?;
                info!(
                    cluster = %workload.cluster,
                    namespace = %workload.namespace,
                    workload = %workload.workload_name,
                    container = %workload.container_name,
                    image = %workload.artifact_url,
                    "patched workload image"
                );
            }
            TaskType::RolloutRestart => {
                agent
                    .trigger_rollout(&workload.namespace, &workload.workload_name)
                    .await?;
                info!(
                    cluster = %workload.cluster,
                    namespace = %workload.namespace,
                    workload = %workload.workload_name,
                    "triggered rollout restart"
                );
            }
            TaskType::Other(other) => {
                return Err(BackendError::Unsupported(format!(
                    "task type '{other}' is not supported for cluster workloads"
                )));
            }
        }
        Ok(())
    }

    async fn probe(
        &self,
        workload: &WorkloadDescriptor,
        _receipt: &(),
    ) -> Result<ProbeReport, BackendError> {
        let agent = self
            .agents
            .resolve_cluster(&workload.cluster, &workload.namespace)?;
        let pods = agent
            .pod_status(&workload.namespace, &workload.workload_name)
            .await?;

        // A pod still rolling reports "False"; "Unknown" is not held against it.
        let ready = pods.iter().all(|pod| pod.ready != "False");
        debug!(
            workload = %workload.workload_name,
            pods = pods.len(),
            ready,
            "observed pod readiness"
        );

        let detail = serde_json::to_string(&pods).ok();
        Ok(if ready {
            ProbeReport::done(true, detail)
        } else {
            ProbeReport::pending(detail)
        })
    }
}
