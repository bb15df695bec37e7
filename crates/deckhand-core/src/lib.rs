//! Deployment orchestration core.
//!
//! Given a registered application and a set of target workloads, the
//! [`Orchestrator`] dispatches a rollout to each workload through a deploy
//! backend (cluster, VM host or HTTP service), probes every workload until it
//! converges or times out, and records the aggregated outcome as the task's
//! terminal state.

mod runtime;

pub mod agent;
pub mod error;
pub mod extract;
pub mod model;
pub mod store;

pub use runtime::aggregate::{Aggregate, PendingOutcome};
pub use runtime::backend;
pub use runtime::orchestrator::{Orchestrator, SubmitRequest};
pub use runtime::prober::{ProbeTiming, TIMEOUT_MESSAGE};
pub use runtime::storage::MemoryStore;

pub use error::{AgentError, BackendError, ExtractError, OrchestratorError, StoreError};
pub use model::{
    Application, DeployType, RepoCredentials, TaskRecord, TaskStatus, TaskType, TaskWorkloadRecord,
    WorkloadDescriptor, WorkloadOutcome,
};
