//! Integration tests for skills-service served over a real socket.
//!
//! Run with: cargo test -p skills-service --test health_check

mod common;

use common::TestApp;
use reqwest::Client;
use service_core::middleware::REQUEST_ID_HEADER;
use skills_service::services::assistants::ScriptedAssistant;
use skills_service::services::metrics::init_metrics;
use skills_service::startup::Application;
use skills_service::AppState;
use std::time::Duration;

/// Serve `state` on a random port and return the base URL.
async fn spawn_app(state: AppState) -> String {
    let app = Application::with_state(state, "127.0.0.1:0")
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        let _ = app.run_until_stopped().await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_returns_ok() {
    let base = spawn_app(TestApp::new().state).await;

    let response = Client::new()
        .get(format!("{}/health", base))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "skills-service");
}

#[tokio::test]
async fn readiness_check_returns_ok_when_every_skill_is_configured() {
    let base = spawn_app(TestApp::new().state).await;

    let response = Client::new()
        .get(format!("{}/ready", base))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn readiness_check_fails_without_an_agent_identity() {
    let app = TestApp::with_assistants(
        ScriptedAssistant::new(),
        ScriptedAssistant::new().unconfigured(),
    );
    let base = spawn_app(app.state).await;

    let response = Client::new()
        .get(format!("{}/ready", base))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status().as_u16(), 503);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "not_ready");
}

#[tokio::test]
async fn skills_listing_reports_capabilities() {
    let app = TestApp::with_assistants(
        ScriptedAssistant::new(),
        ScriptedAssistant::new().unconfigured(),
    );
    let base = spawn_app(app.state).await;

    let body: serde_json::Value = Client::new()
        .get(format!("{}/skills", base))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    let skills = body["skills"].as_array().unwrap();
    assert_eq!(skills.len(), 2);
    let analista = skills
        .iter()
        .find(|s| s["slug"] == "capivara-analista")
        .unwrap();
    assert_eq!(analista["accepts_images"], true);
    assert_eq!(analista["available"], true);
    let conteudo = skills
        .iter()
        .find(|s| s["slug"] == "capivara-conteudo")
        .unwrap();
    assert_eq!(conteudo["accepts_images"], false);
    assert_eq!(conteudo["available"], false);
}

#[tokio::test]
async fn metrics_endpoint_exposes_request_counters() {
    init_metrics().expect("Failed to init metrics");
    let base = spawn_app(TestApp::new().state).await;
    let client = Client::new();

    client
        .get(format!("{}/health", base))
        .send()
        .await
        .expect("Failed to send request");

    let text = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .expect("Failed to read body");

    assert!(text.contains("http_requests_total"));
}
