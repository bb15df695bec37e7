use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::{AgentRegistry, HealthCheck, PushAndStartRequest};
use crate::error::BackendError;
use crate::model::{RepoCredentials, WorkloadDescriptor};
use crate::runtime::backend::{DeployBackend, ProbeReport};

/// Header carrying the repository API key when a host agent downloads the artifact.
pub const ARTIFACT_AUTH_HEADER: &str = "X-JFrog-Art-Api";

/// How long a host is given after its first passing health check.
pub const DEFAULT_VM_SETTLE: Duration = Duration::from_secs(1);

/// Per-application settings for VM deployments, read from `extra_config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmDeployConfig {
    pub deploy_path: String,
    pub deploy_user: String,
    pub pre_command: String,
    pub start_command: String,
    pub health_check: HealthCheck,
}

/// Installs an artifact on each host through its host agent and waits for the
/// application's health check to pass there. The workload name is the host
/// identity.
#[derive(Debug, Clone)]
pub struct VmBackend {
    agents: Arc<AgentRegistry>,
    config: VmDeployConfig,
    credentials: RepoCredentials,
    settle: Duration,
}

impl VmBackend {
    pub fn new(
        agents: Arc<AgentRegistry>,
        config: VmDeployConfig,
        credentials: RepoCredentials,
    ) -> Self {
        Self { agents, config, credentials, settle: DEFAULT_VM_SETTLE }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn push_request(&self, workload: &WorkloadDescriptor) -> PushAndStartRequest {
        let mut headers = HashMap::new();
        headers.insert(ARTIFACT_AUTH_HEADER.to_owned(), self.credentials.password.clone());
        PushAndStartRequest {
            artifact_url: workload.artifact_url.clone(),
            artifact_headers: headers,
            deploy_path: self.config.deploy_path.clone(),
            deploy_user: self.config.deploy_user.clone(),
            pre_command: self.config.pre_command.clone(),
            start_command: self.config.start_command.clone(),
        }
    }
}

impl DeployBackend for VmBackend {
    type Receipt = ();

    async fn dispatch(&self, workload: &WorkloadDescriptor) -> Result<(), BackendError> {
        let host = &workload.workload_name;
        let agent = self.agents.resolve_host(host)?;
        let output = agent.push_and_start(&self.push_request(workload)).await?;
        info!(
            host = %host,
            artifact = %workload.artifact_url,
            output = %output,
            "artifact installed and started"
        );
        Ok(())
    }

    async fn probe(
        &self,
        workload: &WorkloadDescriptor,
        _receipt: &(),
    ) -> Result<ProbeReport, BackendError> {
        let host = &workload.workload_name;
        if self.config.health_check.check_type.eq_ignore_ascii_case("none") {
            return Ok(ProbeReport::done(true, Some(format!("{host}: no health check configured"))));
        }

        let agent = self.agents.resolve_host(host)?;
        match agent.health_check(&self.config.health_check).await {
            Ok(_) => {
                info!(host = %host, "health check passed");
                Ok(ProbeReport::done(true, Some(format!("{host}: healthy"))))
            }
            Err(e) => {
                warn!(host = %host, error = %e, "health check not passing yet");
                Ok(ProbeReport::pending(Some(format!("{host}: {e}"))))
            }
        }
    }

    fn settle_delay(&self) -> Duration {
        self.settle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::HostAgent;
    use crate::error::AgentError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedHost {
        pushed: Mutex<Vec<PushAndStartRequest>>,
        checks: Mutex<Vec<Result<String, AgentError>>>,
    }

    #[async_trait]
    impl HostAgent for ScriptedHost {
        async fn push_and_start(
            &self,
            request: &PushAndStartRequest,
        ) -> Result<String, AgentError> {
            self.pushed.lock().unwrap().push(request.clone());
            Ok("started".into())
        }

        async fn health_check(&self, _check: &HealthCheck) -> Result<String, AgentError> {
            self.checks
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AgentError::Remote("no scripted answer".into())))
        }
    }

    fn config(check_type: &str) -> VmDeployConfig {
        VmDeployConfig {
            deploy_path: "/opt/app".into(),
            deploy_user: "app".into(),
            pre_command: "systemctl stop app".into(),
            start_command: "systemctl start app".into(),
            health_check: HealthCheck { check_type: check_type.into(), ..Default::default() },
        }
    }

    fn backend(host: Arc<ScriptedHost>, check_type: &str) -> VmBackend {
        let mut agents = AgentRegistry::new();
        agents.register_host("10.0.0.5", host);
        VmBackend::new(
            Arc::new(agents),
            config(check_type),
            RepoCredentials { account: "ci".into(), password: "s3cret".into() },
        )
    }

    fn workload() -> WorkloadDescriptor {
        WorkloadDescriptor {
            workload_name: "10.0.0.5".into(),
            artifact_url: "https://repo/app.tar.gz".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn dispatch_sends_artifact_with_repo_key() {
        let host = Arc::new(ScriptedHost::default());
        backend(host.clone(), "http").dispatch(&workload()).await.expect("dispatch");

        let pushed = host.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].artifact_url, "https://repo/app.tar.gz");
        let auth = pushed[0].artifact_headers.get(ARTIFACT_AUTH_HEADER);
        assert_eq!(auth.map(String::as_str), Some("s3cret"));
        assert_eq!(pushed[0].start_command, "systemctl start app");
    }

    #[tokio::test]
    async fn failing_health_check_is_pending_with_host_prefix() {
        let host = Arc::new(ScriptedHost::default());
        host.checks
            .lock()
            .unwrap()
            .push(Err(AgentError::Remote("connection refused".into())));

        let report = backend(host, "http").probe(&workload(), &()).await.expect("probe");
        assert!(!report.done);
        assert_eq!(report.detail.as_deref(), Some("10.0.0.5: connection refused"));
    }

    #[tokio::test]
    async fn health_check_none_succeeds_without_contacting_agent() {
        let agents = Arc::new(AgentRegistry::new());
        let backend = VmBackend::new(agents, config("none"), RepoCredentials::default());
        let report = backend.probe(&workload(), &()).await.expect("probe");
        assert!(report.done && report.success);
    }

    #[test]
    fn settle_delay_defaults_to_one_second() {
        let agents = Arc::new(AgentRegistry::new());
        let backend = VmBackend::new(agents, config("none"), RepoCredentials::default());
        assert_eq!(backend.settle_delay(), DEFAULT_VM_SETTLE);
        assert_eq!(
            backend.with_settle(Duration::from_millis(5)).settle_delay(),
            Duration::from_millis(5)
        );
    }
}
