//! Application registry endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use deckhand_core::store::ApplicationRegistry;
use tracing::info;
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::schemas::v1::application::{ApplicationResponse, PutApplicationRequest};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_applications, get_application, put_application, delete_application),
    components(schemas(ApplicationResponse, PutApplicationRequest))
)]
pub struct ApplicationsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/applications", get(list_applications))
        .route(
            "/applications/{name}",
            get(get_application).put(put_application).delete(delete_application),
        )
}

#[utoipa::path(
    get,
    path = "/v1/applications",
    tag = "applications",
    responses(
        (status = 200, description = "Registered applications", body = [ApplicationResponse]),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_applications(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ApplicationResponse>>, ServerError> {
    let apps = state.store.list_applications().await?;
    Ok(Json(apps.into_iter().map(ApplicationResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/applications/{name}",
    tag = "applications",
    params(
        ("name" = String, Path, description = "Application name")
    ),
    responses(
        (status = 200, description = "Application", body = ApplicationResponse),
        (status = 404, description = "Application not registered"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn get_application(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApplicationResponse>, ServerError> {
    let app = state
        .store
        .get_application(&name)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("application {name} not found")))?;
    Ok(Json(app.into()))
}

/// Register an application, or replace its settings.
#[utoipa::path(
    put,
    path = "/v1/applications/{name}",
    tag = "applications",
    params(
        ("name" = String, Path, description = "Application name")
    ),
    request_body = PutApplicationRequest,
    responses(
        (status = 200, description = "Application stored", body = ApplicationResponse),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn put_application(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<PutApplicationRequest>,
) -> Result<Json<ApplicationResponse>, ServerError> {
    req.validate().map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let app = req.into_application(name).map_err(ServerError::BadRequest)?;
    state.store.put_application(&app).await?;
    info!(app = %app.app_name, deploy_type = %app.deploy_type, "application stored");
    Ok(Json(app.into()))
}

#[utoipa::path(
    delete,
    path = "/v1/applications/{name}",
    tag = "applications",
    params(
        ("name" = String, Path, description = "Application name")
    ),
    responses(
        (status = 204, description = "Application removed"),
        (status = 404, description = "Application not registered"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn delete_application(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ServerError> {
    if !state.store.delete_application(&name).await? {
        return Err(ServerError::NotFound(format!("application {name} not found")));
    }
    info!(app = %name, "application removed");
    Ok(StatusCode::NO_CONTENT)
}
