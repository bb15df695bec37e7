use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::AgentRegistry;
use crate::error::OrchestratorError;
use crate::model::{
    format_elapsed, Application, DeployType, TaskRecord, TaskStatus, TaskType, WorkloadDescriptor,
    WorkloadOutcome,
};
use crate::runtime::aggregate::{self, PendingOutcome};
use crate::runtime::backend::{
    ClusterBackend, DeployBackend, DispatchFailurePolicy, HttpBackend, HttpDeployConfig, VmBackend,
    VmDeployConfig,
};
use crate::runtime::prober::{ProbeTarget, ProbeTiming, Prober};
use crate::store::{ApplicationRegistry, TaskCompletion, TaskStore, WorkloadUpdate};

/// Recorded on workloads that were dispatched but never checked because a later
/// dispatch terminated the task.
pub const ABANDONED_MESSAGE: &str =
    "dispatched but never checked: task terminated by a later dispatch failure";

/// A request to roll an application out to a set of workloads.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    /// Reusing an id overwrites that task's history.
    #[serde(default)]
    pub id: Option<String>,
    pub app_name: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub trigger_type: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub workloads: Vec<WorkloadDescriptor>,
    /// Used for the implicit workload of an HTTP application.
    #[serde(default)]
    pub artifact_url: Option<String>,
}

/// The deploy orchestrator.
///
/// [`submit`](Self::submit) validates a request, records the task and returns
/// its id; execution then continues in the background:
///
/// 1. every workload is dispatched once, in request order;
/// 2. one prober per dispatched workload polls until it converges or times out;
/// 3. the aggregate of all outcomes is written as the task's terminal state.
///
/// The task record is the only way to observe progress after `submit` returns.
pub struct Orchestrator<S> {
    store: Arc<S>,
    agents: Arc<AgentRegistry>,
    http: reqwest::Client,
    timing: ProbeTiming,
}

impl<S> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            agents: Arc::clone(&self.agents),
            http: self.http.clone(),
            timing: self.timing,
        }
    }
}

impl<S> std::fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agents)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

enum SelectedBackend {
    Cluster(ClusterBackend),
    Vm(VmBackend),
    Http(HttpBackend),
}

impl<S> Orchestrator<S>
where
    S: TaskStore + ApplicationRegistry,
{
    pub fn new(store: Arc<S>, agents: Arc<AgentRegistry>) -> Self {
        Self {
            store,
            agents,
            http: reqwest::Client::new(),
            timing: ProbeTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: ProbeTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Client used by the HTTP backend.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    /// Record a new task and start executing it in the background.
    ///
    /// Errors are pre-flight only: when this returns `Err`, no task was created.
    pub async fn submit(&self, request: SubmitRequest) -> Result<String, OrchestratorError> {
        if request.app_name.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest("app_name must not be empty".into()));
        }
        let application = self
            .store
            .get_application(&request.app_name)
            .await?
            .ok_or_else(|| OrchestratorError::ApplicationNotFound {
                app_name: request.app_name.clone(),
            })?;
        let backend = self.select_backend(&application, &request.task_type)?;

        let workloads = match &backend {
            SelectedBackend::Http(http) if request.workloads.is_empty() => {
                let Some(artifact_url) = request.artifact_url.as_deref() else {
                    return Err(OrchestratorError::InvalidRequest(
                        "an HTTP task needs workloads or an artifact_url".into(),
                    ));
                };
                vec![http.default_workload(artifact_url)]
            }
            _ => request.workloads,
        };

        let id = request
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let task = TaskRecord {
            id: id.clone(),
            app_name: request.app_name,
            task_type: request.task_type,
            tenant: request.tenant,
            trigger_type: request.trigger_type,
            status: TaskStatus::Initialize,
            success: None,
            err_message: None,
            labels: request.labels,
            init_at: Some(Utc::now()),
            start_at: None,
            finish_at: None,
            expire: None,
        };
        self.store.save_task(&task).await?;
        let cleared = self.store.clear_workloads(&id).await?;
        info!(
            task_id = %id,
            app = %task.app_name,
            deploy_type = %application.deploy_type,
            workloads = workloads.len(),
            cleared,
            "task accepted"
        );

        let span = info_span!("task", task_id = %id, app = %task.app_name);
        match backend {
            SelectedBackend::Cluster(backend) => self.launch(task, workloads, backend, span),
            SelectedBackend::Vm(backend) => self.launch(task, workloads, backend, span),
            SelectedBackend::Http(backend) => self.launch(task, workloads, backend, span),
        }
        Ok(id)
    }

    fn select_backend(
        &self,
        application: &Application,
        task_type: &TaskType,
    ) -> Result<SelectedBackend, OrchestratorError> {
        Ok(match application.deploy_type {
            DeployType::Cluster => {
                let agents = Arc::clone(&self.agents);
                SelectedBackend::Cluster(ClusterBackend::new(agents, task_type.clone()))
            }
            DeployType::Vm => {
                let config: VmDeployConfig = parse_extra_config(application)?;
                SelectedBackend::Vm(
                    VmBackend::new(Arc::clone(&self.agents), config, application.repo.clone())
                        .with_settle(self.timing.settle),
                )
            }
            DeployType::Http => {
                let config: HttpDeployConfig = parse_extra_config(application)?;
                SelectedBackend::Http(HttpBackend::new(self.http.clone(), config))
            }
        })
    }

    fn launch<B: DeployBackend>(
        &self,
        task: TaskRecord,
        workloads: Vec<WorkloadDescriptor>,
        backend: B,
        span: tracing::Span,
    ) {
        let run = TaskRun {
            store: Arc::clone(&self.store),
            backend: Arc::new(backend),
            prober: Prober::new(self.timing),
        };
        tokio::spawn(run.execute(task, workloads).instrument(span));
    }
}

/// `extra_config` may be stored as a JSON object or as a JSON-encoded string.
fn parse_extra_config<T>(application: &Application) -> Result<T, OrchestratorError>
where
    T: DeserializeOwned + Default,
{
    let parsed = match &application.extra_config {
        serde_json::Value::Null => return Ok(T::default()),
        serde_json::Value::String(raw) if raw.trim().is_empty() => return Ok(T::default()),
        serde_json::Value::String(raw) => serde_json::from_str(raw),
        value => serde_json::from_value(value.clone()),
    };
    parsed.map_err(|e| OrchestratorError::InvalidApplication {
        app_name: application.app_name.clone(),
        message: e.to_string(),
    })
}

/// Background execution of one task.
struct TaskRun<S, B> {
    store: Arc<S>,
    backend: Arc<B>,
    prober: Prober,
}

impl<S, B> TaskRun<S, B>
where
    S: TaskStore,
    B: DeployBackend,
{
    async fn execute(self, task: TaskRecord, workloads: Vec<WorkloadDescriptor>) {
        let mut pending = Vec::with_capacity(workloads.len());
        let mut dispatched = Vec::new();
        let mut started_at: Option<DateTime<Utc>> = None;

        // ── dispatch ────────────────────────────────────────────────────────
        for workload in workloads {
            let record_id = match self.store.insert_workload(&task.id, &workload).await {
                Ok(id) => id,
                Err(e) => {
                    error!(
                        workload = %workload.workload_name,
                        error = %e,
                        "failed to record workload"
                    );
                    let outcome = WorkloadOutcome::failed(workload, e.to_string());
                    pending.push(PendingOutcome::ready(outcome));
                    continue;
                }
            };

            match self.backend.dispatch(&workload).await {
                Ok(receipt) => {
                    info!(
                        cluster = %workload.cluster,
                        namespace = %workload.namespace,
                        workload = %workload.workload_name,
                        "workload dispatched"
                    );
                    let now = Utc::now();
                    match self.store.mark_running(&task.id, now).await {
                        Ok(true) => {
                            started_at = Some(now);
                            info!("task running");
                        }
                        Ok(false) => {}
                        Err(e) => warn!(error = %e, "failed to mark task running"),
                    }
                    dispatched.push(ProbeTarget { record_id, workload, receipt });
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(
                        cluster = %workload.cluster,
                        namespace = %workload.namespace,
                        workload = %workload.workload_name,
                        error = %message,
                        "workload dispatch failed"
                    );
                    self.record_workload(record_id, WorkloadUpdate::error(&message)).await;

                    if self.backend.on_dispatch_failure() == DispatchFailurePolicy::Terminate {
                        for target in &dispatched {
                            warn!(
                                workload = %target.workload.workload_name,
                                "dispatched workload left unchecked"
                            );
                            let update = WorkloadUpdate::error(ABANDONED_MESSAGE);
                            self.record_workload(target.record_id, update).await;
                        }
                        self.finish(&task, started_at, TaskStatus::Terminated, false, Some(message))
                            .await;
                        return;
                    }
                    if let Err(e) = self.store.record_dispatch_failure(&task.id, &message).await {
                        warn!(error = %e, "failed to record dispatch failure on task");
                    }
                    pending.push(PendingOutcome::ready(WorkloadOutcome::failed(workload, message)));
                }
            }
        }

        // ── probe ───────────────────────────────────────────────────────────
        for target in dispatched {
            let (tx, outcome) = PendingOutcome::channel(target.workload.clone());
            pending.push(outcome);

            let span = info_span!(
                "probe",
                cluster = %target.workload.cluster,
                namespace = %target.workload.namespace,
                workload = %target.workload.workload_name,
            );
            let store = Arc::clone(&self.store);
            let backend = Arc::clone(&self.backend);
            let prober = self.prober;
            tokio::spawn(
                async move {
                    let outcome = prober.watch(&*store, &*backend, &target).await;
                    if tx.send(outcome).is_err() {
                        debug!("aggregator gone before the outcome was reported");
                    }
                }
                .instrument(span),
            );
        }

        // ── aggregate ───────────────────────────────────────────────────────
        let aggregate = aggregate::collect(pending).await;
        if aggregate.success() {
            info!(workloads = aggregate.total, "all workloads converged");
        } else {
            error!(
                workloads = aggregate.total,
                failed = aggregate.failures.len(),
                "task finished with failed workloads"
            );
        }
        self.finish(
            &task,
            started_at,
            TaskStatus::Finished,
            aggregate.success(),
            aggregate.err_message(),
        )
        .await;
    }

    async fn record_workload(&self, record_id: i64, update: WorkloadUpdate) {
        if let Err(e) = self.store.update_workload(record_id, update).await {
            warn!(record_id, error = %e, "failed to record workload error");
        }
    }

    async fn finish(
        &self,
        task: &TaskRecord,
        started_at: Option<DateTime<Utc>>,
        status: TaskStatus,
        success: bool,
        err_message: Option<String>,
    ) {
        let finish_at = Utc::now();
        let since = started_at.or(task.init_at).unwrap_or(finish_at);
        let expire = format_elapsed((finish_at - since).to_std().unwrap_or_default());
        let completion = TaskCompletion { status, success, err_message, finish_at, expire };

        match self.store.complete_task(&task.id, completion).await {
            Ok(true) => info!(status = %status, success, "task completed"),
            Ok(false) => warn!(status = %status, "task already terminal, completion discarded"),
            Err(e) => error!(error = %e, "failed to record task completion"),
        }
    }
}
