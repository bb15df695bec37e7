//! SQLite implementation of the task store and application registry.
//!
//! Uses [`sqlx`] with the `sqlite` feature. Migrations are run automatically
//! on startup via [`SqliteStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path at compile time
//! relative to `CARGO_MANIFEST_DIR`, so the directory is embedded into the
//! binary. The database file is chosen at runtime by `DECKHAND_DATABASE_URL`.
//!
//! # Queries
//!
//! The runtime-verified `sqlx::query` form is used so no `DATABASE_URL` is
//! needed at compile time. Task state transitions are conditional `UPDATE`s;
//! `rows_affected` tells the caller whether the guard held.

use chrono::{DateTime, Utc};
use deckhand_core::model::{
    format_elapsed, Application, TaskRecord, TaskStatus, TaskWorkloadRecord, WorkloadDescriptor,
};
use deckhand_core::store::{
    ApplicationRegistry, TaskCompletion, TaskStore, WorkloadUpdate, INTERRUPTED_MESSAGE,
};
use deckhand_core::StoreError;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use super::{
    application_from_row, task_from_row, workload_from_row, ApplicationRow, TaskRow, WorkloadRow,
    TASK_COLUMNS, WORKLOAD_COLUMNS,
};

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn db(e: sqlx::Error) -> StoreError {
    StoreError::backend(e)
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://deckhand.db?mode=rwc"` or `"sqlite::memory:"` for tests.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let mut options = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            // Each connection to :memory: is its own database.
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Round-trips a trivial query to confirm the database still answers.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(db)?;
        Ok(())
    }

    /// Register or replace an application.
    pub async fn put_application(&self, application: &Application) -> Result<(), StoreError> {
        let extra_config =
            serde_json::to_string(&application.extra_config).map_err(|e| StoreError::Corrupt {
                table: "applications",
                reason: e.to_string(),
            })?;
        sqlx::query(
            "INSERT INTO applications (app_name, deploy_type, repo_account, repo_password, extra_config, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(app_name) DO UPDATE SET \
                 deploy_type = excluded.deploy_type, \
                 repo_account = excluded.repo_account, \
                 repo_password = excluded.repo_password, \
                 extra_config = excluded.extra_config, \
                 updated_at = excluded.updated_at",
        )
        .bind(&application.app_name)
        .bind(application.deploy_type.as_str())
        .bind(&application.repo.account)
        .bind(&application.repo.password)
        .bind(&extra_config)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    pub async fn list_applications(&self) -> Result<Vec<Application>, StoreError> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "SELECT app_name, deploy_type, repo_account, repo_password, extra_config \
             FROM applications ORDER BY app_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(application_from_row).collect()
    }

    pub async fn delete_application(&self, app_name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM applications WHERE app_name = ?1")
            .bind(app_name)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }
}

// ── TaskStore ─────────────────────────────────────────────────────────────────

impl TaskStore for SqliteStore {
    async fn save_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let labels = serde_json::to_string(&record.labels).map_err(|e| StoreError::Corrupt {
            table: "task_history",
            reason: e.to_string(),
        })?;
        sqlx::query(
            "INSERT INTO task_history \
                 (id, app_name, task_type, tenant, trigger_type, status, success, err_message, labels, \
                  init_at, start_at, finish_at, expire) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             ON CONFLICT(id) DO UPDATE SET \
                 app_name = excluded.app_name, \
                 task_type = excluded.task_type, \
                 tenant = excluded.tenant, \
                 trigger_type = excluded.trigger_type, \
                 status = excluded.status, \
                 success = excluded.success, \
                 err_message = excluded.err_message, \
                 labels = excluded.labels, \
                 init_at = excluded.init_at, \
                 start_at = excluded.start_at, \
                 finish_at = excluded.finish_at, \
                 expire = excluded.expire",
        )
        .bind(&record.id)
        .bind(&record.app_name)
        .bind(record.task_type.to_string())
        .bind(&record.tenant)
        .bind(&record.trigger_type)
        .bind(record.status.as_str())
        .bind(record.success)
        .bind(&record.err_message)
        .bind(&labels)
        .bind(record.init_at.map(|t| t.to_rfc3339()))
        .bind(record.start_at.map(|t| t.to_rfc3339()))
        .bind(record.finish_at.map(|t| t.to_rfc3339()))
        .bind(&record.expire)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn clear_workloads(&self, task_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM task_history_workload WHERE task_id = ?1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected())
    }

    async fn insert_workload(
        &self,
        task_id: &str,
        workload: &WorkloadDescriptor,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO task_history_workload \
                 (task_id, cluster, namespace, workload_type, workload_name, container_name, artifact_url, update_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(task_id)
        .bind(&workload.cluster)
        .bind(&workload.namespace)
        .bind(&workload.workload_type)
        .bind(&workload.workload_name)
        .bind(&workload.container_name)
        .bind(&workload.artifact_url)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.last_insert_rowid())
    }

    async fn update_workload(
        &self,
        record_id: i64,
        update: WorkloadUpdate,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE task_history_workload \
             SET status = COALESCE(?1, status), err_message = COALESCE(?2, err_message), update_at = ?3 \
             WHERE id = ?4",
        )
        .bind(update.status)
        .bind(update.err_message)
        .bind(Utc::now().to_rfc3339())
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn mark_running(&self, task_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE task_history SET status = 'running', start_at = ?1 \
             WHERE id = ?2 AND status = 'initialize' AND start_at IS NULL",
        )
        .bind(at.to_rfc3339())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_dispatch_failure(
        &self,
        task_id: &str,
        message: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE task_history SET success = 0, err_message = ?1 \
             WHERE id = ?2 AND status IN ('initialize', 'running') AND err_message IS NULL",
        )
        .bind(message)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_task(
        &self,
        task_id: &str,
        completion: TaskCompletion,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE task_history \
             SET status = ?1, success = ?2, err_message = COALESCE(?3, err_message), finish_at = ?4, expire = ?5 \
             WHERE id = ?6 AND status IN ('initialize', 'running')",
        )
        .bind(completion.status.as_str())
        .bind(completion.success)
        .bind(completion.err_message)
        .bind(completion.finish_at.to_rfc3339())
        .bind(completion.expire)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_task(
        &self,
        task_id: &str,
        tenant: Option<&str>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task_history WHERE id = ?1 AND (?2 IS NULL OR tenant = ?2)"
        ))
        .bind(task_id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(task_from_row).transpose()
    }

    async fn list_tasks(&self, tenant: Option<&str>) -> Result<Vec<TaskRecord>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task_history WHERE (?1 IS NULL OR tenant = ?1) ORDER BY init_at DESC"
        ))
        .bind(tenant)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(task_from_row).collect()
    }

    async fn list_workloads(&self, task_id: &str) -> Result<Vec<TaskWorkloadRecord>, StoreError> {
        let rows: Vec<WorkloadRow> = sqlx::query_as(&format!(
            "SELECT {WORKLOAD_COLUMNS} FROM task_history_workload WHERE task_id = ?1 ORDER BY id"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(workload_from_row).collect()
    }

    async fn delete_task_history(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query("DELETE FROM task_history_workload WHERE task_id = ?1")
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        let result = sqlx::query("DELETE FROM task_history WHERE id = ?1")
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn interrupt_inflight_tasks(&self, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let inflight: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM task_history WHERE status IN ('initialize', 'running')"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(db)?;

        let mut count = 0;
        for row in inflight {
            let task = task_from_row(row)?;
            let since = task.start_at.or(task.init_at).unwrap_or(at);
            let expire = format_elapsed((at - since).to_std().unwrap_or_default());
            let result = sqlx::query(
                "UPDATE task_history \
                 SET status = ?1, success = 0, err_message = ?2, finish_at = ?3, expire = ?4 \
                 WHERE id = ?5 AND status IN ('initialize', 'running')",
            )
            .bind(TaskStatus::Terminated.as_str())
            .bind(INTERRUPTED_MESSAGE)
            .bind(at.to_rfc3339())
            .bind(&expire)
            .bind(&task.id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
            count += result.rows_affected();
        }
        tx.commit().await.map_err(db)?;
        Ok(count)
    }
}

impl ApplicationRegistry for SqliteStore {
    async fn get_application(&self, app_name: &str) -> Result<Option<Application>, StoreError> {
        let row: Option<ApplicationRow> = sqlx::query_as(
            "SELECT app_name, deploy_type, repo_account, repo_password, extra_config \
             FROM applications WHERE app_name = ?1",
        )
        .bind(app_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(application_from_row).transpose()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::model::{DeployType, RepoCredentials, TaskType};
    use std::collections::BTreeMap;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.expect("in-memory db")
    }

    fn task(id: &str, tenant: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            app_name: "shop".into(),
            task_type: TaskType::DeployImage,
            tenant: tenant.into(),
            trigger_type: "manual".into(),
            status: TaskStatus::Initialize,
            success: None,
            err_message: None,
            labels: BTreeMap::from([("release".to_owned(), "42".to_owned())]),
            init_at: Some(Utc::now()),
            start_at: None,
            finish_at: None,
            expire: None,
        }
    }

    fn completion(status: TaskStatus, success: bool, err_message: Option<&str>) -> TaskCompletion {
        TaskCompletion {
            status,
            success,
            err_message: err_message.map(str::to_owned),
            finish_at: Utc::now(),
            expire: "2.5s".into(),
        }
    }

    #[tokio::test]
    async fn task_round_trips_through_sqlite() {
        let store = store().await;
        let record = task("t1", "team-a");
        store.save_task(&record).await.unwrap();

        let loaded = store.get_task("t1", None).await.unwrap().expect("task");
        assert_eq!(loaded.task_type, TaskType::DeployImage);
        assert_eq!(loaded.labels.get("release").map(String::as_str), Some("42"));
        assert_eq!(loaded.status, TaskStatus::Initialize);
        assert_eq!(loaded.success, None);
    }

    #[tokio::test]
    async fn transitions_are_guarded() {
        let store = store().await;
        store.save_task(&task("t1", "a")).await.unwrap();

        assert!(store.mark_running("t1", Utc::now()).await.unwrap());
        assert!(!store.mark_running("t1", Utc::now()).await.unwrap());
        assert!(store.record_dispatch_failure("t1", "first").await.unwrap());
        assert!(!store.record_dispatch_failure("t1", "second").await.unwrap());
        assert!(store
            .complete_task("t1", completion(TaskStatus::Finished, false, None))
            .await
            .unwrap());
        assert!(!store
            .complete_task("t1", completion(TaskStatus::Terminated, false, Some("late")))
            .await
            .unwrap());

        let loaded = store.get_task("t1", None).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Finished);
        assert_eq!(loaded.success, Some(false));
        assert_eq!(loaded.err_message.as_deref(), Some("first"));
        assert_eq!(loaded.expire.as_deref(), Some("2.5s"));
        assert!(loaded.start_at.is_some());
    }

    #[tokio::test]
    async fn workloads_update_and_clear() {
        let store = store().await;
        store.save_task(&task("t1", "a")).await.unwrap();
        let workload = WorkloadDescriptor {
            cluster: "prod".into(),
            namespace: "web".into(),
            workload_name: "api".into(),
            ..Default::default()
        };
        let id = store.insert_workload("t1", &workload).await.unwrap();
        store.update_workload(id, WorkloadUpdate::status("[]")).await.unwrap();
        store.update_workload(id, WorkloadUpdate::error("boom")).await.unwrap();

        let records = store.list_workloads("t1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].workload, workload);
        assert_eq!(records[0].status.as_deref(), Some("[]"));
        assert_eq!(records[0].err_message.as_deref(), Some("boom"));

        assert_eq!(store.clear_workloads("t1").await.unwrap(), 1);
        assert!(store.list_workloads("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tenant_filter_applies() {
        let store = store().await;
        store.save_task(&task("t1", "a")).await.unwrap();
        store.save_task(&task("t2", "b")).await.unwrap();

        assert!(store.get_task("t1", Some("b")).await.unwrap().is_none());
        assert_eq!(store.list_tasks(Some("a")).await.unwrap().len(), 1);
        assert_eq!(store.list_tasks(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_history_removes_task_and_workloads() {
        let store = store().await;
        store.save_task(&task("t1", "a")).await.unwrap();
        store.insert_workload("t1", &WorkloadDescriptor::default()).await.unwrap();

        assert!(store.delete_task_history("t1").await.unwrap());
        assert!(store.get_task("t1", None).await.unwrap().is_none());
        assert!(store.list_workloads("t1").await.unwrap().is_empty());
        assert!(!store.delete_task_history("t1").await.unwrap());
    }

    #[tokio::test]
    async fn interrupt_inflight_tasks_on_startup() {
        let store = store().await;
        store.save_task(&task("pending", "a")).await.unwrap();
        store.save_task(&task("running", "a")).await.unwrap();
        store.mark_running("running", Utc::now()).await.unwrap();
        store.save_task(&task("done", "a")).await.unwrap();
        store
            .complete_task("done", completion(TaskStatus::Finished, true, None))
            .await
            .unwrap();

        assert_eq!(store.interrupt_inflight_tasks(Utc::now()).await.unwrap(), 2);
        for id in ["pending", "running"] {
            let loaded = store.get_task(id, None).await.unwrap().unwrap();
            assert_eq!(loaded.status, TaskStatus::Terminated);
            assert_eq!(loaded.err_message.as_deref(), Some(INTERRUPTED_MESSAGE));
            assert!(loaded.expire.is_some());
        }
        let done = store.get_task("done", None).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Finished);
    }

    #[tokio::test]
    async fn applications_crud() {
        let store = store().await;
        let app = Application {
            app_name: "shop".into(),
            deploy_type: DeployType::Vm,
            repo: RepoCredentials { account: "ci".into(), password: "key".into() },
            extra_config: serde_json::json!({ "deploy_path": "/opt/shop" }),
        };
        store.put_application(&app).await.unwrap();
        assert_eq!(store.get_application("shop").await.unwrap(), Some(app.clone()));
        assert_eq!(store.list_applications().await.unwrap().len(), 1);

        assert!(store.delete_application("shop").await.unwrap());
        assert!(store.get_application("shop").await.unwrap().is_none());
    }
}
