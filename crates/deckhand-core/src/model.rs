use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Lifecycle state of a [`TaskRecord`].
///
/// `Initialize` → `Running` → `Finished`, with `Terminated` as the alternate
/// terminal state used when an HTTP dispatch fails before any probing starts
/// and when in-flight tasks are recovered after a restart.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Initialize,
    Running,
    Finished,
    Terminated,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Returns `true` for `Finished` and `Terminated`. A terminal status is
    /// never overwritten.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Terminated)
    }
}

/// What a task does to its workloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum TaskType {
    /// Patch a container image to the workload's artifact URL.
    DeployImage,
    /// Restart the workload without changing its spec.
    RolloutRestart,
    /// Anything else; passed through for VM and HTTP applications.
    #[strum(default)]
    Other(String),
}

// `From<&str>` is derived by `EnumString`: unknown strings map to `Other`.

impl Serialize for TaskType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TaskType::from(s.as_str()))
    }
}

/// How an application is rolled out.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "snake_case")]
pub enum DeployType {
    #[serde(alias = "container", alias = "容器")]
    #[strum(to_string = "cluster", serialize = "container", serialize = "容器")]
    Cluster,
    #[serde(alias = "虚拟机")]
    #[strum(to_string = "vm", serialize = "虚拟机")]
    Vm,
    #[serde(alias = "HTTP")]
    #[strum(to_string = "http", serialize = "HTTP")]
    Http,
}

impl DeployType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Artifact repository credentials attached to an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCredentials {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
}

/// A registered application, as returned by the application registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub app_name: String,
    pub deploy_type: DeployType,
    #[serde(default)]
    pub repo: RepoCredentials,
    /// Backend-specific settings (`VmDeployConfig` / `HttpDeployConfig`).
    #[serde(default)]
    pub extra_config: serde_json::Value,
}

/// Immutable identity of one deployment target.
///
/// A VM target uses `workload_name` as the host identity; an HTTP target uses
/// it as the endpoint base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub workload_type: String,
    #[serde(default)]
    pub workload_name: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub artifact_url: String,
}

/// One rollout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub app_name: String,
    pub task_type: TaskType,
    pub tenant: String,
    pub trigger_type: String,
    pub status: TaskStatus,
    pub success: Option<bool>,
    pub err_message: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub init_at: Option<DateTime<Utc>>,
    pub start_at: Option<DateTime<Utc>>,
    pub finish_at: Option<DateTime<Utc>>,
    pub expire: Option<String>,
}

/// One target within a task. Owned by its [`TaskRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWorkloadRecord {
    pub id: i64,
    pub task_id: String,
    pub workload: WorkloadDescriptor,
    /// Last observed health, backend-specific encoding.
    pub status: Option<String>,
    pub err_message: Option<String>,
    pub update_at: DateTime<Utc>,
}

/// Final result of one workload, produced by a prober (or by a failed
/// dispatch) and consumed by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadOutcome {
    pub workload: WorkloadDescriptor,
    pub success: bool,
    pub error: Option<String>,
}

impl WorkloadOutcome {
    pub fn succeeded(workload: WorkloadDescriptor) -> Self {
        Self { workload, success: true, error: None }
    }

    pub fn failed(workload: WorkloadDescriptor, error: impl Into<String>) -> Self {
        Self { workload, success: false, error: Some(error.into()) }
    }
}

impl fmt::Display for WorkloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cluster={} Namespace={} WorkloadType={} WorkloadName={} Success={} Err={}",
            self.workload.cluster,
            self.workload.namespace,
            self.workload.workload_type,
            self.workload.workload_name,
            self.success,
            self.error.as_deref().unwrap_or(""),
        )
    }
}

/// Render an elapsed duration the way task history has always shown it:
/// truncated to milliseconds, `1h2m3.5s` style.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    if total_ms == 0 {
        return "0s".to_owned();
    }
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let millis = total_ms % 60_000;
    let seconds = format_seconds(millis);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn format_seconds(millis: u128) -> String {
    let whole = millis / 1000;
    let frac = millis % 1000;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:03}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
