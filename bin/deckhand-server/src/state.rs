//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use deckhand_core::Orchestrator;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;

#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Task history and application registry.
    pub store: Arc<SqliteStore>,
    /// Runs submitted tasks against `store`.
    pub orchestrator: Orchestrator<SqliteStore>,
}
