//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - per-request trace-ID middleware
//! - health route
//! - `/v1` task, application and agent routes
//! - the OpenAPI document at `/api-docs/openapi.json` (disable with
//!   `DECKHAND_ENABLE_OPENAPI=false`)

pub mod doc;
mod health;
mod v1;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Json, Router};

use crate::middleware::trace;
use crate::state::AppState;

pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/v1", v1::router());

    if state.config.enable_openapi {
        let api_doc = doc::get_docs();
        app = app.route("/api-docs/openapi.json", get(move || {
            let doc = api_doc.clone();
            async move { Json(doc) }
        }));
    }

    app.layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
