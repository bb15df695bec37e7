//! Error types for the orchestration core.
//!
//! Every per-workload failure ends up as a string recorded against the task;
//! these types exist so the layers can tell failures apart before that happens.

use thiserror::Error;

/// Failures of the declarative response extractor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The path query selected nothing in the document.
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    /// The path query could not be parsed.
    #[error("invalid path query '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A keyword was not a valid regular expression.
    #[error("invalid keyword pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Failures reported by the agent resolver or by a remote agent.
///
/// Remote failures are opaque strings; no structured codes cross this line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// No registered agent matches the lookup key.
    #[error("agent not found: {key}")]
    NotFound { key: String },

    /// The agent could not be reached.
    #[error("agent transport error: {0}")]
    Transport(String),

    /// The agent ran the action and it failed.
    #[error("{0}")]
    Remote(String),
}

/// Failures of a deploy backend's dispatch or probe.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Calling the HTTP endpoint failed before a response arrived.
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The HTTP endpoint answered with a non-2xx status.
    #[error("{action} returned status {status}: {body}")]
    HttpStatus {
        action: &'static str,
        status: u16,
        body: String,
    },

    /// The deploy response did not match the configured keyword.
    #[error("http deploy rejected with response: {body}")]
    Rejected { body: String },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The application or task asks for something this backend cannot do.
    #[error("{0}")]
    Unsupported(String),
}

/// Failures of the task store or application registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage engine failed.
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A persisted row could not be decoded.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl StoreError {
    /// Wrap any storage-engine error.
    pub fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(e))
    }
}

/// Pre-flight failures of [`crate::Orchestrator::submit`]. Once a submission
/// has returned a task id, nothing is reported through this type any more.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("application not found: {app_name}")]
    ApplicationNotFound { app_name: String },

    /// The application's stored configuration cannot drive its backend.
    #[error("invalid configuration for application '{app_name}': {message}")]
    InvalidApplication { app_name: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
