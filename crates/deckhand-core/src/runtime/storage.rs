use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::{
    format_elapsed, Application, TaskRecord, TaskStatus, TaskWorkloadRecord, WorkloadDescriptor,
};
use crate::store::{
    ApplicationRegistry, TaskCompletion, TaskStore, WorkloadUpdate, INTERRUPTED_MESSAGE,
};

#[derive(Debug, Default)]
struct Tables {
    tasks: HashMap<String, TaskRecord>,
    workloads: HashMap<i64, TaskWorkloadRecord>,
    applications: HashMap<String, Application>,
}

/// Process-local task store and application registry, used in tests and by
/// embedders that do not need history to outlive the process.
///
/// All three tables sit behind one lock. A state transition checks its guard
/// and applies the change under a single write guard, so `mark_running` and
/// `complete_task` behave like the conditional `UPDATE`s of the SQL store.
/// Workload ids come from a counter and are never reused.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
    next_workload_id: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an application.
    pub async fn put_application(&self, application: Application) {
        self.inner
            .write()
            .await
            .applications
            .insert(application.app_name.clone(), application);
    }

    pub async fn list_applications(&self) -> Vec<Application> {
        let mut apps: Vec<_> = self.inner.read().await.applications.values().cloned().collect();
        apps.sort_by(|a, b| a.app_name.cmp(&b.app_name));
        apps
    }

    pub async fn delete_application(&self, app_name: &str) -> bool {
        self.inner.write().await.applications.remove(app_name).is_some()
    }
}

fn visible(task: &TaskRecord, tenant: Option<&str>) -> bool {
    tenant.is_none_or(|t| task.tenant == t)
}

impl TaskStore for MemoryStore {
    async fn save_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .tasks
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn clear_workloads(&self, task_id: &str) -> Result<u64, StoreError> {
        let mut guard = self.inner.write().await;
        let before = guard.workloads.len();
        guard.workloads.retain(|_, w| w.task_id != task_id);
        Ok((before - guard.workloads.len()) as u64)
    }

    async fn insert_workload(
        &self,
        task_id: &str,
        workload: &WorkloadDescriptor,
    ) -> Result<i64, StoreError> {
        let id = self.next_workload_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = TaskWorkloadRecord {
            id,
            task_id: task_id.to_owned(),
            workload: workload.clone(),
            status: None,
            err_message: None,
            update_at: Utc::now(),
        };
        self.inner.write().await.workloads.insert(id, record);
        Ok(id)
    }

    async fn update_workload(
        &self,
        record_id: i64,
        update: WorkloadUpdate,
    ) -> Result<(), StoreError> {
        if let Some(record) = self.inner.write().await.workloads.get_mut(&record_id) {
            if let Some(status) = update.status {
                record.status = Some(status);
            }
            if let Some(message) = update.err_message {
                record.err_message = Some(message);
            }
            record.update_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_running(&self, task_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(task) = guard.tasks.get_mut(task_id) else {
            return Ok(false);
        };
        if task.status != TaskStatus::Initialize || task.start_at.is_some() {
            return Ok(false);
        }
        task.status = TaskStatus::Running;
        task.start_at = Some(at);
        Ok(true)
    }

    async fn record_dispatch_failure(
        &self,
        task_id: &str,
        message: &str,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(task) = guard.tasks.get_mut(task_id) else {
            return Ok(false);
        };
        if task.status.is_terminal() || task.err_message.is_some() {
            return Ok(false);
        }
        task.success = Some(false);
        task.err_message = Some(message.to_owned());
        Ok(true)
    }

    async fn complete_task(
        &self,
        task_id: &str,
        completion: TaskCompletion,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let Some(task) = guard.tasks.get_mut(task_id) else {
            return Ok(false);
        };
        if task.status.is_terminal() {
            return Ok(false);
        }
        task.status = completion.status;
        task.success = Some(completion.success);
        if completion.err_message.is_some() {
            task.err_message = completion.err_message;
        }
        task.finish_at = Some(completion.finish_at);
        task.expire = Some(completion.expire);
        Ok(true)
    }

    async fn get_task(
        &self,
        task_id: &str,
        tenant: Option<&str>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .get(task_id)
            .filter(|t| visible(t, tenant))
            .cloned())
    }

    async fn list_tasks(&self, tenant: Option<&str>) -> Result<Vec<TaskRecord>, StoreError> {
        let mut tasks: Vec<_> = self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| visible(t, tenant))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.init_at.cmp(&a.init_at));
        Ok(tasks)
    }

    async fn list_workloads(&self, task_id: &str) -> Result<Vec<TaskWorkloadRecord>, StoreError> {
        let mut workloads: Vec<_> = self
            .inner
            .read()
            .await
            .workloads
            .values()
            .filter(|w| w.task_id == task_id)
            .cloned()
            .collect();
        workloads.sort_by_key(|w| w.id);
        Ok(workloads)
    }

    async fn delete_task_history(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let existed = guard.tasks.remove(task_id).is_some();
        guard.workloads.retain(|_, w| w.task_id != task_id);
        Ok(existed)
    }

    async fn interrupt_inflight_tasks(&self, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut guard = self.inner.write().await;
        let mut count = 0;
        for task in guard.tasks.values_mut().filter(|t| !t.status.is_terminal()) {
            let since = task.start_at.or(task.init_at).unwrap_or(at);
            task.status = TaskStatus::Terminated;
            task.success = Some(false);
            task.err_message = Some(INTERRUPTED_MESSAGE.to_owned());
            task.finish_at = Some(at);
            task.expire = Some(format_elapsed((at - since).to_std().unwrap_or_default()));
            count += 1;
        }
        Ok(count)
    }
}

impl ApplicationRegistry for MemoryStore {
    async fn get_application(&self, app_name: &str) -> Result<Option<Application>, StoreError> {
        Ok(self.inner.read().await.applications.get(app_name).cloned())
    }
}
