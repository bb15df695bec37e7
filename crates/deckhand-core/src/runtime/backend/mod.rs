//! Deploy backends.
//!
//! A backend knows how to start a rollout on one workload ([`DeployBackend::dispatch`])
//! and how to tell whether that workload has converged ([`DeployBackend::probe`]).
//! The orchestrator and the prober are written against this trait only.

pub mod cluster;
pub mod http;
pub mod vm;

use std::future::Future;
use std::time::Duration;

use crate::error::BackendError;
use crate::model::WorkloadDescriptor;

pub use cluster::ClusterBackend;
pub use http::{HttpBackend, HttpCheckConfig, HttpDeployConfig, HttpReceipt};
pub use vm::{VmBackend, VmDeployConfig};

/// Result of a single completion check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// The workload has converged; stop probing.
    pub done: bool,
    /// Only meaningful when `done` is set.
    pub success: bool,
    /// Last observed health, persisted as the workload record's status.
    pub detail: Option<String>,
}

impl ProbeReport {
    pub fn pending(detail: Option<String>) -> Self {
        Self { done: false, success: false, detail }
    }

    pub fn done(success: bool, detail: Option<String>) -> Self {
        Self { done: true, success, detail }
    }
}

/// What the orchestrator does when a workload's dispatch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFailurePolicy {
    /// Record the failure and carry on with the remaining workloads; the task
    /// still ends in `finished`.
    Continue,
    /// Stop the task immediately in `terminated`; no prober is started.
    Terminate,
}

pub trait DeployBackend: Send + Sync + 'static {
    /// Whatever the probe needs to know about a successful dispatch.
    type Receipt: Send + Sync + 'static;

    /// Perform exactly one remote action that starts the rollout of `workload`.
    /// Not idempotent; the orchestrator calls it at most once per workload.
    fn dispatch(
        &self,
        workload: &WorkloadDescriptor,
    ) -> impl Future<Output = Result<Self::Receipt, BackendError>> + Send;

    /// Evaluate completion once. Errors are treated as transient.
    fn probe(
        &self,
        workload: &WorkloadDescriptor,
        receipt: &Self::Receipt,
    ) -> impl Future<Output = Result<ProbeReport, BackendError>> + Send;

    fn on_dispatch_failure(&self) -> DispatchFailurePolicy {
        DispatchFailurePolicy::Continue
    }

    /// Extra wait between a successful probe and reporting the outcome.
    fn settle_delay(&self) -> Duration {
        Duration::ZERO
    }
}
