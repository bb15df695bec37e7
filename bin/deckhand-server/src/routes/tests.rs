use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use deckhand_core::agent::AgentRegistry;
use deckhand_core::Orchestrator;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::state::AppState;

async fn app() -> Router {
    let config = Config {
        bind_address: "127.0.0.1:0".into(),
        database_url: "sqlite::memory:".into(),
        log_level: "info".into(),
        log_json: false,
        agents_file: "agents.toml".into(),
        agent_timeout_secs: 5,
        probe_grace_secs: 0,
        probe_interval_secs: 1,
        probe_deadline_secs: 5,
        enable_openapi: true,
    };
    let store = Arc::new(SqliteStore::connect(&config.database_url).await.expect("in-memory db"));
    let orchestrator = Orchestrator::new(store.clone(), Arc::new(AgentRegistry::new()))
        .with_timing(config.probe_timing());
    super::build(Arc::new(AppState { config: Arc::new(config), store, orchestrator }))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, tenant: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-tenant", tenant)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, tenant: &str) -> Request<Body> {
    Request::builder().uri(uri).header("x-tenant", tenant).body(Body::empty()).unwrap()
}

async fn register_shop(app: &Router) {
    let (status, body) = send(
        app,
        json_request(
            "PUT",
            "/v1/applications/shop",
            "team-a",
            json!({ "deploy_type": "cluster", "repo_account": "ci", "repo_password": "s3cret" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_repo_password"], true);
    assert!(body.get("repo_password").is_none());
}

async fn wait_finished(app: &Router, id: &str, tenant: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = send(app, get(&format!("/v1/tasks/{id}"), tenant)).await;
        assert_eq!(status, StatusCode::OK);
        if body["task"]["status"] == "finished" || body["task"]["status"] == "terminated" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {id} never reached a terminal state");
}

// ── health & docs ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_carries_trace_header() {
    let app = app().await;
    let response = app.oneshot(get("/health", "x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-trace-id"));
}

#[tokio::test]
async fn health_reports_database_and_agent_counts() {
    let app = app().await;
    let (status, body) = send(&app, get("/health", "x")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert!(!body["version"].as_str().unwrap_or("").is_empty());
    assert_eq!(body["agents"]["clusters"], 0);
    assert_eq!(body["agents"]["hosts"], 0);
}

#[tokio::test]
async fn openapi_document_lists_task_routes() {
    let app = app().await;
    let (status, body) = send(&app, get("/api-docs/openapi.json", "x")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/v1/tasks").is_some());
    assert!(body["paths"].get("/v1/applications/{name}").is_some());
}

// ── applications ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_deploy_type_is_rejected() {
    let app = app().await;
    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            "/v1/applications/shop",
            "team-a",
            json!({ "deploy_type": "mainframe" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("mainframe"));
}

#[tokio::test]
async fn application_lifecycle() {
    let app = app().await;
    register_shop(&app).await;

    let (status, body) = send(&app, get("/v1/applications", "team-a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/v1/applications/shop")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get("/v1/applications/shop", "team-a")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── tasks ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn submitted_task_is_visible_to_its_tenant_only() {
    let app = app().await;
    register_shop(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/tasks",
            "team-a",
            json!({ "app_name": "shop", "task_type": "deploy-image", "trigger_type": "manual" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["id"].as_str().expect("task id").to_owned();

    let detail = wait_finished(&app, &id, "team-a").await;
    assert_eq!(detail["task"]["tenant"], "team-a");
    assert_eq!(detail["task"]["success"], true);
    assert_eq!(detail["workloads"], json!([]));

    let (status, _) = send(&app, get(&format!("/v1/tasks/{id}"), "team-b")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send(&app, get("/v1/tasks", "team-b")).await;
    assert_eq!(listed, json!([]));

    let admin = Request::builder()
        .uri("/v1/tasks")
        .header("x-tenant", "ops")
        .header("x-role", "admin")
        .body(Body::empty())
        .unwrap();
    let (_, listed) = send(&app, admin).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn submit_for_unregistered_application_is_not_found() {
    let app = app().await;
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/tasks",
            "team-a",
            json!({ "app_name": "ghost", "task_type": "deploy-image" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_app_name_fails_validation() {
    let app = app().await;
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/tasks",
            "team-a",
            json!({ "app_name": "", "task_type": "deploy-image" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn finished_task_can_be_deleted() {
    let app = app().await;
    register_shop(&app).await;
    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/tasks",
            "team-a",
            json!({ "app_name": "shop", "task_type": "rollout-restart" }),
        ),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_owned();
    wait_finished(&app, &id, "team-a").await;

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/tasks/{id}"))
        .header("x-tenant", "team-a")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/v1/tasks/{id}"), "team-a")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── agents ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn agents_endpoint_lists_nothing_without_agents_file() {
    let app = app().await;
    let (status, body) = send(&app, get("/v1/agents", "team-a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "clusters": [], "hosts": [] }));
}
