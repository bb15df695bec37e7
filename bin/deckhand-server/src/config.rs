//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use deckhand_core::ProbeTiming;

/// Runtime configuration for deckhand-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8080"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://deckhand.db?mode=rwc"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// TOML file listing the cluster and host agents. A missing file yields
    /// an empty registry.
    pub agents_file: String,

    /// Request timeout for agent calls and HTTP deploy/check calls.
    pub agent_timeout_secs: u64,

    pub probe_grace_secs: u64,
    pub probe_interval_secs: u64,
    pub probe_deadline_secs: u64,

    /// Serve `/api-docs/openapi.json`.
    pub enable_openapi: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("DECKHAND_BIND", "0.0.0.0:8080"),
            database_url: env_or("DECKHAND_DATABASE_URL", "sqlite://deckhand.db?mode=rwc"),
            log_level: env_or("DECKHAND_LOG", "info"),
            log_json: env_flag("DECKHAND_LOG_JSON", false),
            agents_file: env_or("DECKHAND_AGENTS_FILE", "agents.toml"),
            agent_timeout_secs: parse_env("DECKHAND_AGENT_TIMEOUT_SECS", 30),
            probe_grace_secs: parse_env("DECKHAND_PROBE_GRACE_SECS", 10),
            probe_interval_secs: parse_env("DECKHAND_PROBE_INTERVAL_SECS", 3),
            probe_deadline_secs: parse_env("DECKHAND_PROBE_DEADLINE_SECS", 300),
            enable_openapi: env_flag("DECKHAND_ENABLE_OPENAPI", true),
        }
    }

    pub fn probe_timing(&self) -> ProbeTiming {
        ProbeTiming {
            grace: Duration::from_secs(self.probe_grace_secs),
            interval: Duration::from_secs(self.probe_interval_secs),
            deadline: Duration::from_secs(self.probe_deadline_secs),
            ..ProbeTiming::default()
        }
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
