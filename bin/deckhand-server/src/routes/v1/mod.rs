pub mod agents;
pub mod applications;
pub mod tasks;

use crate::state::AppState;
use utoipa::OpenApi;

use axum::Router;
use std::sync::Arc;

/// Routes nested under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(tasks::router())
        .merge(applications::router())
        .merge(agents::router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct V1Api;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut doc = V1Api::openapi();
    doc.merge(tasks::TasksApi::openapi());
    doc.merge(applications::ApplicationsApi::openapi());
    doc.merge(agents::AgentsApi::openapi());
    doc
}
