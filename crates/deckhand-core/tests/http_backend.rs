//! Integration tests for the HTTP deploy backend using wiremock.

use std::collections::HashMap;

use deckhand_core::backend::{DeployBackend, HttpBackend, HttpCheckConfig, HttpDeployConfig};
use deckhand_core::{BackendError, WorkloadDescriptor};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> HttpDeployConfig {
    HttpDeployConfig {
        http_url: server.uri(),
        http_path: "/deploy".into(),
        http_method: "post".into(),
        http_content_type: "json".into(),
        http_body: r#"{"artifact":"{{artifact_url}}","env":"prod"}"#.into(),
        health_check: HttpCheckConfig {
            method: "get".into(),
            http_path: "/jobs/{{response$.data.job_id}}".into(),
            finish_jsonpath: "$.status".into(),
            finish_keyword: "^(SUCCESS|FAILED)$".into(),
            success_jsonpath: "$.status".into(),
            success_keyword: "^SUCCESS$".into(),
            msg_jsonpath: "job ended: {{$.message}}".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn workload(artifact: &str) -> WorkloadDescriptor {
    WorkloadDescriptor {
        workload_type: "HTTP".into(),
        artifact_url: artifact.into(),
        ..Default::default()
    }
}

async fn mount_deploy(server: &MockServer, response: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/deploy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(server)
        .await;
}

#[tokio::test]
async fn dispatch_substitutes_artifact_into_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/deploy"))
        .and(body_json(json!({ "artifact": "https://repo/app-1.2.jar", "env": "prod" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "job_id": "j-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(reqwest::Client::new(), config(&server));
    let receipt = backend
        .dispatch(&workload("https://repo/app-1.2.jar"))
        .await
        .expect("dispatch");

    assert_eq!(receipt.base_url, server.uri());
    assert_eq!(receipt.check.http_path, "/jobs/j-1");
}

#[tokio::test]
async fn dispatch_sends_form_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/deploy"))
        .and(header("x-token", "secret"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("version=2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(
        reqwest::Client::new(),
        HttpDeployConfig {
            http_url: server.uri(),
            http_path: "/deploy".into(),
            http_method: "PUT".into(),
            http_content_type: "x-www-form-urlencoded".into(),
            http_header: HashMap::from([("x-token".to_owned(), "secret".to_owned())]),
            http_body: r#"{"version":"2"}"#.into(),
            ..Default::default()
        },
    );

    backend.dispatch(&workload("unused")).await.expect("dispatch");
}

#[tokio::test]
async fn dispatch_non_2xx_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/deploy"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(reqwest::Client::new(), config(&server));
    let err = backend.dispatch(&workload("a")).await.unwrap_err();

    match err {
        BackendError::HttpStatus { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn dispatch_keyword_mismatch_is_rejected() {
    let server = MockServer::start().await;
    mount_deploy(&server, json!({ "ok": false, "data": { "job_id": "j-1" } })).await;

    let mut config = config(&server);
    config.res_jsonpath = "$.ok".into();
    config.res_keyword = "true".into();
    let backend = HttpBackend::new(reqwest::Client::new(), config);

    let err = backend.dispatch(&workload("a")).await.unwrap_err();
    assert!(matches!(err, BackendError::Rejected { .. }), "got {err:?}");
}

#[tokio::test]
async fn dispatch_fails_when_check_marker_cannot_resolve() {
    let server = MockServer::start().await;
    mount_deploy(&server, json!({ "data": {} })).await;

    let backend = HttpBackend::new(reqwest::Client::new(), config(&server));
    let err = backend.dispatch(&workload("a")).await.unwrap_err();
    assert!(matches!(err, BackendError::Extract(_)), "got {err:?}");
}

#[tokio::test]
async fn probe_reports_finished_success_with_message() {
    let server = MockServer::start().await;
    mount_deploy(&server, json!({ "data": { "job_id": "j-9" } })).await;
    Mock::given(method("GET"))
        .and(path("/jobs/j-9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "SUCCESS", "message": "deployed 3 nodes" })),
        )
        .mount(&server)
        .await;

    let backend = HttpBackend::new(reqwest::Client::new(), config(&server));
    let target = workload("a");
    let receipt = backend.dispatch(&target).await.expect("dispatch");
    let report = backend.probe(&target, &receipt).await.expect("probe");

    assert!(report.done);
    assert!(report.success);
    assert_eq!(report.detail.as_deref(), Some("job ended: deployed 3 nodes"));
}

#[tokio::test]
async fn probe_finished_failure_is_done_but_unsuccessful() {
    let server = MockServer::start().await;
    mount_deploy(&server, json!({ "data": { "job_id": "j-2" } })).await;
    Mock::given(method("GET"))
        .and(path("/jobs/j-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "FAILED", "message": "disk full" })),
        )
        .mount(&server)
        .await;

    let backend = HttpBackend::new(reqwest::Client::new(), config(&server));
    let target = workload("a");
    let receipt = backend.dispatch(&target).await.expect("dispatch");
    let report = backend.probe(&target, &receipt).await.expect("probe");

    assert!(report.done);
    assert!(!report.success);
    assert_eq!(report.detail.as_deref(), Some("job ended: disk full"));
}

#[tokio::test]
async fn probe_running_job_is_pending() {
    let server = MockServer::start().await;
    mount_deploy(&server, json!({ "data": { "job_id": "j-3" } })).await;
    Mock::given(method("GET"))
        .and(path("/jobs/j-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "RUNNING" })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(reqwest::Client::new(), config(&server));
    let target = workload("a");
    let receipt = backend.dispatch(&target).await.expect("dispatch");
    let report = backend.probe(&target, &receipt).await.expect("probe");

    assert!(!report.done);
}

#[tokio::test]
async fn probe_non_2xx_is_a_transient_error() {
    let server = MockServer::start().await;
    mount_deploy(&server, json!({ "data": { "job_id": "j-4" } })).await;
    Mock::given(method("GET"))
        .and(path("/jobs/j-4"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(reqwest::Client::new(), config(&server));
    let target = workload("a");
    let receipt = backend.dispatch(&target).await.expect("dispatch");
    let err = backend.probe(&target, &receipt).await.unwrap_err();

    assert!(matches!(err, BackendError::HttpStatus { status: 502, .. }));
}

#[tokio::test]
async fn probe_without_check_method_succeeds_immediately() {
    let server = MockServer::start().await;
    mount_deploy(&server, json!({ "data": { "job_id": "j-5" } })).await;

    let mut config = config(&server);
    config.health_check = HttpCheckConfig::default();
    let backend = HttpBackend::new(reqwest::Client::new(), config);
    let target = workload("a");
    let receipt = backend.dispatch(&target).await.expect("dispatch");
    let report = backend.probe(&target, &receipt).await.expect("probe");

    assert!(report.done && report.success);
}
