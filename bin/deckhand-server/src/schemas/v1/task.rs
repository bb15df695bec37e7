use std::collections::BTreeMap;

use deckhand_core::{SubmitRequest, TaskRecord, TaskType, TaskWorkloadRecord, WorkloadDescriptor};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Body of `POST /v1/tasks`. The tenant comes from the `x-tenant` header.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitTaskRequest {
    /// Reuse an existing task id to re-run it; omitted means a fresh id.
    pub id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub app_name: String,
    /// `deploy-image`, `rollout-restart`, or any other backend-specific value.
    #[validate(length(min = 1))]
    pub task_type: String,
    #[serde(default)]
    pub trigger_type: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub workloads: Vec<WorkloadDescriptor>,
    /// Artifact for the implicit workload of an HTTP application.
    pub artifact_url: Option<String>,
}

impl SubmitTaskRequest {
    pub fn into_submit(self, tenant: String) -> SubmitRequest {
        SubmitRequest {
            id: self.id,
            app_name: self.app_name,
            task_type: TaskType::from(self.task_type.as_str()),
            trigger_type: self.trigger_type,
            tenant,
            labels: self.labels,
            workloads: self.workloads,
            artifact_url: self.artifact_url,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitTaskResponse {
    pub id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: String,
    pub app_name: String,
    pub task_type: String,
    pub tenant: String,
    pub trigger_type: String,
    /// `initialize`, `running`, `finished` or `terminated`.
    pub status: String,
    pub success: Option<bool>,
    pub err_message: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub init_at: Option<String>,
    pub start_at: Option<String>,
    pub finish_at: Option<String>,
    pub expire: Option<String>,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_type: record.task_type.to_string(),
            status: record.status.to_string(),
            init_at: record.init_at.map(|t| t.to_rfc3339()),
            start_at: record.start_at.map(|t| t.to_rfc3339()),
            finish_at: record.finish_at.map(|t| t.to_rfc3339()),
            id: record.id,
            app_name: record.app_name,
            tenant: record.tenant,
            trigger_type: record.trigger_type,
            success: record.success,
            err_message: record.err_message,
            labels: record.labels,
            expire: record.expire,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkloadResponse {
    pub id: i64,
    pub cluster: String,
    pub namespace: String,
    pub workload_type: String,
    pub workload_name: String,
    pub container_name: String,
    pub artifact_url: String,
    /// Last observed health, backend-specific.
    pub status: Option<String>,
    pub err_message: Option<String>,
    pub update_at: String,
}

impl From<TaskWorkloadRecord> for WorkloadResponse {
    fn from(record: TaskWorkloadRecord) -> Self {
        let w = record.workload;
        Self {
            id: record.id,
            cluster: w.cluster,
            namespace: w.namespace,
            workload_type: w.workload_type,
            workload_name: w.workload_name,
            container_name: w.container_name,
            artifact_url: w.artifact_url,
            status: record.status,
            err_message: record.err_message,
            update_at: record.update_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskDetailResponse {
    pub task: TaskResponse,
    pub workloads: Vec<WorkloadResponse>,
}
