//! Database layer.
//!
//! The orchestrator only sees the [`deckhand_core::store::TaskStore`] and
//! [`deckhand_core::store::ApplicationRegistry`] traits; [`sqlite::SqliteStore`]
//! implements both on top of sqlx. Row decoding lives here so that a second
//! engine could share it.

pub mod sqlite;

use chrono::{DateTime, Utc};
use deckhand_core::model::{
    Application, DeployType, RepoCredentials, TaskRecord, TaskStatus, TaskType, TaskWorkloadRecord,
    WorkloadDescriptor,
};
use deckhand_core::StoreError;

/// Column list shared by every `task_history` SELECT.
pub(crate) const TASK_COLUMNS: &str = "id, app_name, task_type, tenant, trigger_type, status, success, \
     err_message, labels, init_at, start_at, finish_at, expire";

pub(crate) const WORKLOAD_COLUMNS: &str = "id, task_id, cluster, namespace, workload_type, workload_name, \
     container_name, artifact_url, status, err_message, update_at";

pub(crate) type TaskRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<bool>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

pub(crate) type WorkloadRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

pub(crate) type ApplicationRow = (String, String, String, String, String);

fn corrupt(table: &'static str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt { table, reason: reason.to_string() }
}

fn parse_time(table: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("timestamp '{value}': {e}")))
}

fn parse_optional_time(
    table: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.as_deref().map(|v| parse_time(table, v)).transpose()
}

pub(crate) fn task_from_row(row: TaskRow) -> Result<TaskRecord, StoreError> {
    let (
        id,
        app_name,
        task_type,
        tenant,
        trigger_type,
        status,
        success,
        err_message,
        labels,
        init_at,
        start_at,
        finish_at,
        expire,
    ) = row;
    Ok(TaskRecord {
        status: status.parse::<TaskStatus>().map_err(|e| corrupt("task_history", e))?,
        labels: serde_json::from_str(&labels).map_err(|e| corrupt("task_history", e))?,
        init_at: parse_optional_time("task_history", init_at)?,
        start_at: parse_optional_time("task_history", start_at)?,
        finish_at: parse_optional_time("task_history", finish_at)?,
        task_type: TaskType::from(task_type.as_str()),
        id,
        app_name,
        tenant,
        trigger_type,
        success,
        err_message,
        expire,
    })
}

pub(crate) fn workload_from_row(row: WorkloadRow) -> Result<TaskWorkloadRecord, StoreError> {
    let (
        id,
        task_id,
        cluster,
        namespace,
        workload_type,
        workload_name,
        container_name,
        artifact_url,
        status,
        err_message,
        update_at,
    ) = row;
    Ok(TaskWorkloadRecord {
        id,
        task_id,
        workload: WorkloadDescriptor {
            cluster,
            namespace,
            workload_type,
            workload_name,
            container_name,
            artifact_url,
        },
        status,
        err_message,
        update_at: parse_time("task_history_workload", &update_at)?,
    })
}

pub(crate) fn application_from_row(row: ApplicationRow) -> Result<Application, StoreError> {
    let (app_name, deploy_type, account, password, extra_config) = row;
    Ok(Application {
        deploy_type: deploy_type
            .parse::<DeployType>()
            .map_err(|e| corrupt("applications", e))?,
        extra_config: serde_json::from_str(&extra_config).map_err(|e| corrupt("applications", e))?,
        repo: RepoCredentials { account, password },
        app_name,
    })
}
