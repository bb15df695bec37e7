//! Fan-in of per-workload outcomes.
//!
//! Every workload gets its own single-use channel. One collector per channel
//! records failures into a shared list; the aggregate is produced once all
//! collectors have joined, so it never depends on arrival order.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::warn;

use crate::model::{WorkloadDescriptor, WorkloadOutcome};

const PROBER_VANISHED: &str = "prober exited without reporting an outcome";

/// A workload's outcome, possibly still in flight.
#[derive(Debug)]
pub struct PendingOutcome {
    workload: WorkloadDescriptor,
    rx: oneshot::Receiver<WorkloadOutcome>,
}

impl PendingOutcome {
    /// Create the channel for a workload whose outcome arrives later.
    pub fn channel(workload: WorkloadDescriptor) -> (oneshot::Sender<WorkloadOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { workload, rx })
    }

    /// An outcome that is already known, e.g. a failed dispatch.
    pub fn ready(outcome: WorkloadOutcome) -> Self {
        let (tx, pending) = Self::channel(outcome.workload.clone());
        let _ = tx.send(outcome);
        pending
    }

    async fn resolve(self) -> WorkloadOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => WorkloadOutcome::failed(self.workload, PROBER_VANISHED),
        }
    }
}

/// The task-level verdict over all workloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub total: usize,
    /// Rendered failed outcomes, sorted.
    pub failures: Vec<String>,
}

impl Aggregate {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    /// JSON array of the failures, or `None` when everything succeeded.
    pub fn err_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            serde_json::to_string(&self.failures).ok()
        }
    }
}

/// Wait for every pending outcome and fold them into an [`Aggregate`].
///
/// Zero outcomes is an immediate success.
pub async fn collect(pending: Vec<PendingOutcome>) -> Aggregate {
    let total = pending.len();
    let failures = Arc::new(Mutex::new(Vec::new()));

    let mut collectors = JoinSet::new();
    for outcome in pending {
        let failures = Arc::clone(&failures);
        collectors.spawn(async move {
            let outcome = outcome.resolve().await;
            if !outcome.success {
                failures.lock().await.push(outcome.to_string());
            }
        });
    }
    while let Some(joined) = collectors.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "outcome collector did not complete");
        }
    }

    let mut failures = std::mem::take(&mut *failures.lock().await);
    failures.sort();
    Aggregate { total, failures }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(name: &str) -> WorkloadDescriptor {
        WorkloadDescriptor {
            cluster: "prod".into(),
            namespace: "web".into(),
            workload_type: "deployment".into(),
            workload_name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_input_is_success() {
        let aggregate = collect(Vec::new()).await;
        assert!(aggregate.success());
        assert_eq!(aggregate.err_message(), None);
    }

    #[tokio::test]
    async fn failures_are_rendered_and_order_independent() {
        let build = |order: &[&str]| {
            order
                .iter()
                .map(|name| match *name {
                    "ok" => PendingOutcome::ready(WorkloadOutcome::succeeded(workload("ok"))),
                    other => {
                        PendingOutcome::ready(WorkloadOutcome::failed(workload(other), "boom"))
                    }
                })
                .collect::<Vec<_>>()
        };

        let forward = collect(build(&["a", "ok", "b"])).await;
        let backward = collect(build(&["b", "ok", "a"])).await;

        assert_eq!(forward, backward);
        assert_eq!(forward.total, 3);
        assert!(!forward.success());
        assert_eq!(
            forward.failures[0],
            "Cluster=prod Namespace=web WorkloadType=deployment WorkloadName=a Success=false Err=boom"
        );
        let parsed: Vec<String> = serde_json::from_str(&forward.err_message().unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn late_outcomes_are_awaited() {
        let (tx, pending) = PendingOutcome::channel(workload("slow"));
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let _ = tx.send(WorkloadOutcome::succeeded(workload("slow")));
        });
        assert!(collect(vec![pending]).await.success());
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_failure() {
        let (tx, pending) = PendingOutcome::channel(workload("lost"));
        drop(tx);
        let aggregate = collect(vec![pending]).await;
        assert!(!aggregate.success());
        assert!(aggregate.failures[0].contains(PROBER_VANISHED));
    }
}
