use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::model::{WorkloadDescriptor, WorkloadOutcome};
use crate::runtime::backend::DeployBackend;
use crate::store::{TaskStore, WorkloadUpdate};

/// Error recorded against a workload that did not converge before its deadline.
pub const TIMEOUT_MESSAGE: &str = "TIMEOUT and TERMINATED";

const REPORTED_FAILURE: &str = "workload reported failure";

/// Polling schedule shared by every prober of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTiming {
    /// Wait after dispatch before the first probe.
    pub grace: Duration,
    /// Wait between probes.
    pub interval: Duration,
    /// Time allowed from the first probe until the workload is given up on.
    pub deadline: Duration,
    /// Passed to backends that settle after converging (VM hosts).
    pub settle: Duration,
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            interval: Duration::from_secs(3),
            deadline: Duration::from_secs(300),
            settle: Duration::from_secs(1),
        }
    }
}

/// A workload whose dispatch succeeded, waiting to be probed.
#[derive(Debug)]
pub(crate) struct ProbeTarget<R> {
    pub record_id: i64,
    pub workload: WorkloadDescriptor,
    pub receipt: R,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Prober {
    timing: ProbeTiming,
}

impl Prober {
    pub fn new(timing: ProbeTiming) -> Self {
        Self { timing }
    }

    /// Poll `backend` for `target` until it converges or the deadline passes.
    ///
    /// Probe errors are logged and retried; only the deadline ends a
    /// workload without the backend's say. Store failures never end it.
    pub async fn watch<S, B>(
        &self,
        store: &S,
        backend: &B,
        target: &ProbeTarget<B::Receipt>,
    ) -> WorkloadOutcome
    where
        S: TaskStore,
        B: DeployBackend,
    {
        let workload = &target.workload;
        let record_id = target.record_id;
        sleep(self.timing.grace).await;
        let deadline = Instant::now() + self.timing.deadline;

        loop {
            if Instant::now() >= deadline {
                error!("workload {TIMEOUT_MESSAGE}");
                persist(store, record_id, WorkloadUpdate::error(TIMEOUT_MESSAGE)).await;
                return WorkloadOutcome::failed(workload.clone(), TIMEOUT_MESSAGE);
            }

            match timeout_at(deadline, backend.probe(workload, &target.receipt)).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "probe failed, retrying");
                    persist(store, record_id, WorkloadUpdate::error(e.to_string())).await;
                }
                Ok(Ok(report)) if report.done => {
                    let outcome = if report.success {
                        info!("workload converged");
                        WorkloadOutcome::succeeded(workload.clone())
                    } else {
                        let message =
                            report.detail.clone().unwrap_or_else(|| REPORTED_FAILURE.to_owned());
                        warn!(error = %message, "workload finished unsuccessfully");
                        WorkloadOutcome::failed(workload.clone(), message)
                    };
                    let update = WorkloadUpdate {
                        status: report.detail,
                        err_message: outcome.error.clone(),
                    };
                    persist(store, record_id, update).await;

                    let settle = backend.settle_delay();
                    if !settle.is_zero() {
                        sleep(settle).await;
                    }
                    return outcome;
                }
                Ok(Ok(report)) => {
                    debug!("workload not converged yet");
                    if let Some(detail) = report.detail {
                        persist(store, record_id, WorkloadUpdate::status(detail)).await;
                    }
                }
            }

            sleep(self.timing.interval).await;
        }
    }
}

async fn persist<S: TaskStore>(store: &S, record_id: i64, update: WorkloadUpdate) {
    if let Err(e) = store.update_workload(record_id, update).await {
        warn!(record_id, error = %e, "failed to persist workload progress");
    }
}
