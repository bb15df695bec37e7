//! Persistence contracts for task history and the application registry.
//!
//! Task writes are shaped after the task state machine rather than exposed as
//! free-form updates: each transition method carries its own guard, so a
//! terminal status can never be regressed by a late `running` write and
//! `start_at` / `finish_at` are each written at most once.
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{Application, TaskRecord, TaskStatus, TaskWorkloadRecord, WorkloadDescriptor};

/// Error message written to tasks that were still in flight when the
/// orchestrator restarted.
pub const INTERRUPTED_MESSAGE: &str = "interrupted: orchestrator restarted before completion";

/// Fields of a workload record touched by dispatch and probing. `None`
/// leaves the column as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadUpdate {
    pub status: Option<String>,
    pub err_message: Option<String>,
}

impl WorkloadUpdate {
    pub fn status(status: impl Into<String>) -> Self {
        Self { status: Some(status.into()), err_message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: None, err_message: Some(message.into()) }
    }
}

/// The terminal write for a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCompletion {
    pub status: TaskStatus,
    pub success: bool,
    pub err_message: Option<String>,
    pub finish_at: DateTime<Utc>,
    pub expire: String,
}

pub trait TaskStore: Send + Sync + 'static {
    /// Insert or fully overwrite a task row.
    fn save_task(&self, record: &TaskRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove all workload rows of a task. Returns the number removed.
    fn clear_workloads(&self, task_id: &str)
    -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Create a workload row and return its id.
    fn insert_workload(
        &self,
        task_id: &str,
        workload: &WorkloadDescriptor,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn update_workload(
        &self,
        record_id: i64,
        update: WorkloadUpdate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// `initialize` → `running`, stamping `start_at`. Returns `false` when the
    /// task was not in `initialize`.
    fn mark_running(
        &self,
        task_id: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Record the first dispatch failure of a non-terminal task: sets
    /// `success = false` and `err_message` unless an error is already present.
    fn record_dispatch_failure(
        &self,
        task_id: &str,
        message: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Move a non-terminal task to its terminal status. Returns `false` when
    /// the task was already terminal (or does not exist).
    fn complete_task(
        &self,
        task_id: &str,
        completion: TaskCompletion,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Fetch a task, optionally restricted to one tenant.
    fn get_task(
        &self,
        task_id: &str,
        tenant: Option<&str>,
    ) -> impl Future<Output = Result<Option<TaskRecord>, StoreError>> + Send;

    /// Newest first, optionally restricted to one tenant.
    fn list_tasks(
        &self,
        tenant: Option<&str>,
    ) -> impl Future<Output = Result<Vec<TaskRecord>, StoreError>> + Send;

    fn list_workloads(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Vec<TaskWorkloadRecord>, StoreError>> + Send;

    /// Delete a task together with its workload rows. Returns `false` when
    /// no such task exists.
    fn delete_task_history(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Terminate every task still in `initialize` or `running`. Called once
    /// at startup, before any new task is accepted.
    fn interrupt_inflight_tasks(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Read access to registered applications.
pub trait ApplicationRegistry: Send + Sync + 'static {
    fn get_application(
        &self,
        app_name: &str,
    ) -> impl Future<Output = Result<Option<Application>, StoreError>> + Send;
}
