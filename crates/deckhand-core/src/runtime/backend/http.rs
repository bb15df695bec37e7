use std::collections::HashMap;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::extract::{matches_keyword, substitute};
use crate::model::WorkloadDescriptor;
use crate::runtime::backend::{DeployBackend, DispatchFailurePolicy, ProbeReport};

/// Replaced with the workload's artifact URL in the deploy body.
pub const ARTIFACT_MARKER: &str = "{{artifact_url}}";

/// Marker prefix for values taken from the deploy response.
pub const RESPONSE_MARKER_PREFIX: &str = "response";

/// Per-application settings for HTTP deployments, read from `extra_config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpDeployConfig {
    pub http_url: String,
    pub http_path: String,
    /// `post` or `put`.
    pub http_method: String,
    /// `json` or `x-www-form-urlencoded`.
    pub http_content_type: String,
    pub http_header: HashMap<String, String>,
    pub http_body: String,
    pub res_jsonpath: String,
    pub res_keyword: String,
    pub health_check: HttpCheckConfig,
}

/// The completion check of an HTTP application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpCheckConfig {
    /// `get` or `post`; anything else disables the check.
    pub method: String,
    pub http_path: String,
    pub http_body: String,
    pub finish_jsonpath: String,
    pub finish_keyword: String,
    pub success_jsonpath: String,
    pub success_keyword: String,
    pub msg_jsonpath: String,
}

/// What a successful deploy call leaves for the probe: the endpoint it was
/// sent to and the check with its `{{response$...}}` markers resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReceipt {
    pub base_url: String,
    pub check: HttpCheckConfig,
}

/// Deploys by calling an HTTP endpoint and polls a second endpoint until the
/// declared "finished" field matches.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpDeployConfig,
}

impl HttpBackend {
    pub fn new(client: Client, config: HttpDeployConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &HttpDeployConfig {
        &self.config
    }

    /// The single workload used when a submission names none.
    pub fn default_workload(&self, artifact_url: &str) -> WorkloadDescriptor {
        WorkloadDescriptor {
            workload_type: "HTTP".to_owned(),
            workload_name: self.config.http_url.clone(),
            artifact_url: artifact_url.to_owned(),
            ..Default::default()
        }
    }

    fn base_url<'a>(&'a self, workload: &'a WorkloadDescriptor) -> &'a str {
        if workload.workload_name.is_empty() {
            &self.config.http_url
        } else {
            &workload.workload_name
        }
    }

    fn with_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.config.http_header {
            request = request.header(name, value);
        }
        request
    }

    fn deploy_request(&self, url: &str, body: &str) -> Result<RequestBuilder, BackendError> {
        let request = match self.config.http_method.to_ascii_lowercase().as_str() {
            "post" => self.client.post(url),
            "put" => self.client.put(url),
            other => {
                return Err(BackendError::Unsupported(format!(
                    "unsupported http method '{other}'"
                )));
            }
        };
        let request = self.with_headers(request);

        match self.config.http_content_type.to_ascii_lowercase().as_str() {
            "json" => {
                let body: Value = parse_request_body(body, "{}")?;
                Ok(request.json(&body))
            }
            "x-www-form-urlencoded" => {
                let form: HashMap<String, String> = parse_request_body(body, "{}")?;
                Ok(request.form(&form))
            }
            other => Err(BackendError::Unsupported(format!(
                "unsupported content type 'application/{other}'"
            ))),
        }
    }

    fn check_request(
        &self,
        url: &str,
        check: &HttpCheckConfig,
    ) -> Result<Option<RequestBuilder>, BackendError> {
        let request = match check.method.to_ascii_lowercase().as_str() {
            "get" => self.client.get(url),
            "post" => {
                let body: Value = parse_request_body(&check.http_body, "{}")?;
                self.client.post(url).json(&body)
            }
            _ => return Ok(None),
        };
        Ok(Some(self.with_headers(request)))
    }
}

impl DeployBackend for HttpBackend {
    type Receipt = HttpReceipt;

    async fn dispatch(&self, workload: &WorkloadDescriptor) -> Result<HttpReceipt, BackendError> {
        let base_url = self.base_url(workload).to_owned();
        let url = join_url(&base_url, &self.config.http_path);
        let body = self.config.http_body.replace(ARTIFACT_MARKER, &workload.artifact_url);

        let response = self.deploy_request(&url, &body)?.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                action: "http deploy",
                status: status.as_u16(),
                body: text,
            });
        }

        let document = parse_response(&text);
        if !self.config.res_jsonpath.is_empty()
            && !matches_keyword(&document, &self.config.res_jsonpath, &self.config.res_keyword)?
        {
            return Err(BackendError::Rejected { body: text });
        }

        let mut check = self.config.health_check.clone();
        check.http_path = substitute(&check.http_path, RESPONSE_MARKER_PREFIX, &document)?;
        check.http_body = substitute(&check.http_body, RESPONSE_MARKER_PREFIX, &document)?;

        info!(url = %url, response = %text, "http deploy accepted");
        Ok(HttpReceipt { base_url, check })
    }

    async fn probe(
        &self,
        _workload: &WorkloadDescriptor,
        receipt: &HttpReceipt,
    ) -> Result<ProbeReport, BackendError> {
        let check = &receipt.check;
        let url = join_url(&receipt.base_url, &check.http_path);
        let Some(request) = self.check_request(&url, check)? else {
            return Ok(ProbeReport::done(true, Some("no http check configured".to_owned())));
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                action: "http check",
                status: status.as_u16(),
                body: text,
            });
        }

        let document = parse_response(&text);
        let finished = matches_keyword(&document, &check.finish_jsonpath, &check.finish_keyword)?;
        debug!(url = %url, finished, response = %text, "http check observed");
        if !finished {
            return Ok(ProbeReport::pending(None));
        }

        let success = matches_keyword(&document, &check.success_jsonpath, &check.success_keyword)?;
        let message = if check.msg_jsonpath.is_empty() {
            None
        } else {
            Some(substitute(&check.msg_jsonpath, "", &document)?)
        };
        Ok(ProbeReport::done(success, message))
    }

    fn on_dispatch_failure(&self) -> DispatchFailurePolicy {
        DispatchFailurePolicy::Terminate
    }
}

fn parse_request_body<T>(body: &str, empty: &str) -> Result<T, BackendError>
where
    T: serde::de::DeserializeOwned,
{
    let source = if body.trim().is_empty() { empty } else { body };
    serde_json::from_str(source)
        .map_err(|e| BackendError::Unsupported(format!("request body is not valid JSON: {e}")))
}

/// Responses that are not JSON are matched as a plain string.
fn parse_response(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_owned();
    }
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes_and_absolute_paths() {
        assert_eq!(join_url("http://svc/", "/deploy"), "http://svc/deploy");
        assert_eq!(join_url("http://svc", "deploy"), "http://svc/deploy");
        assert_eq!(join_url("http://svc", ""), "http://svc");
        assert_eq!(join_url("http://svc", "https://other/check"), "https://other/check");
    }

    #[test]
    fn non_json_response_is_matched_as_text() {
        assert_eq!(parse_response("OK"), Value::String("OK".into()));
        assert_eq!(parse_response(r#"{"a":1}"#)["a"], 1);
    }

    #[test]
    fn default_workload_targets_configured_url() {
        let backend = HttpBackend::new(
            Client::new(),
            HttpDeployConfig { http_url: "http://svc".into(), ..Default::default() },
        );
        let workload = backend.default_workload("https://repo/app.jar");
        assert_eq!(workload.workload_type, "HTTP");
        assert_eq!(workload.workload_name, "http://svc");
        assert_eq!(workload.artifact_url, "https://repo/app.jar");
    }

    #[test]
    fn config_reads_partial_extra_config() {
        let config: HttpDeployConfig = serde_json::from_value(serde_json::json!({
            "http_url": "http://svc",
            "http_method": "post",
            "health_check": { "method": "get", "finish_jsonpath": "$.done" }
        }))
        .unwrap();
        assert_eq!(config.http_method, "post");
        assert_eq!(config.health_check.finish_jsonpath, "$.done");
        assert!(config.http_header.is_empty());
    }

    #[test]
    fn unsupported_method_is_a_dispatch_error() {
        let backend = HttpBackend::new(
            Client::new(),
            HttpDeployConfig {
                http_method: "delete".into(),
                http_content_type: "json".into(),
                ..Default::default()
            },
        );
        assert!(matches!(
            backend.deploy_request("http://svc", ""),
            Err(BackendError::Unsupported(_))
        ));
    }
}
