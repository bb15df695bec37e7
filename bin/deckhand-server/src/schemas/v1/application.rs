use deckhand_core::backend::{HttpDeployConfig, VmDeployConfig};
use deckhand_core::{Application, DeployType, RepoCredentials};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Body of `PUT /v1/applications/{name}`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PutApplicationRequest {
    /// `cluster`, `vm` or `http`.
    #[validate(length(min = 1))]
    pub deploy_type: String,
    #[serde(default)]
    pub repo_account: String,
    #[serde(default)]
    pub repo_password: String,
    /// Backend settings: VM deploy paths and health check, or the HTTP
    /// deploy and check endpoints.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub extra_config: serde_json::Value,
}

impl PutApplicationRequest {
    /// Build the application, rejecting an unknown deploy type or an
    /// `extra_config` its backend cannot read.
    pub fn into_application(self, app_name: String) -> Result<Application, String> {
        let deploy_type: DeployType = self
            .deploy_type
            .parse()
            .map_err(|_| format!("unknown deploy type: {}", self.deploy_type))?;
        let checked = match deploy_type {
            DeployType::Vm => check_extra_config::<VmDeployConfig>(&self.extra_config),
            DeployType::Http => check_extra_config::<HttpDeployConfig>(&self.extra_config),
            DeployType::Cluster => Ok(()),
        };
        checked.map_err(|e| format!("invalid extra_config for {deploy_type} application: {e}"))?;

        Ok(Application {
            app_name,
            deploy_type,
            repo: RepoCredentials { account: self.repo_account, password: self.repo_password },
            extra_config: self.extra_config,
        })
    }
}

/// `extra_config` is accepted as a JSON object or as a JSON-encoded string.
fn check_extra_config<T>(value: &serde_json::Value) -> Result<(), serde_json::Error>
where
    T: DeserializeOwned,
{
    match value {
        serde_json::Value::Null => Ok(()),
        serde_json::Value::String(raw) if raw.trim().is_empty() => Ok(()),
        serde_json::Value::String(raw) => serde_json::from_str::<T>(raw).map(drop),
        other => T::deserialize(other).map(drop),
    }
}

/// An application as returned by the API. The repository password is never
/// echoed back.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApplicationResponse {
    pub app_name: String,
    pub deploy_type: String,
    pub repo_account: String,
    pub has_repo_password: bool,
    #[schema(value_type = Object)]
    pub extra_config: serde_json::Value,
}

impl From<Application> for ApplicationResponse {
    fn from(app: Application) -> Self {
        Self {
            deploy_type: app.deploy_type.to_string(),
            has_repo_password: !app.repo.password.is_empty(),
            repo_account: app.repo.account,
            app_name: app.app_name,
            extra_config: app.extra_config,
        }
    }
}
