//! Integration tests for the HTTP API
//!
//! Each test serves the router on an ephemeral port with mock backends and
//! talks to it over real HTTP.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use aim::api::{self, AppState};
use aim::devbox::HttpReadinessProbe;
use aim::session::{BrowserSessions, CodebaseSessions};
use common::{CountingProbe, EchoBrowserAgent, EchoCodebaseAgent, MockBrowser, Readiness};

struct TestServer {
    base: String,
    client: reqwest::Client,
    backend: Arc<MockBrowser>,
    probe: Arc<CountingProbe>,
    codebase_agent: Arc<EchoCodebaseAgent>,
    browser: Arc<BrowserSessions<MockBrowser>>,
}

impl TestServer {
    async fn start() -> Self {
        let backend = Arc::new(MockBrowser::default());
        let probe = Arc::new(CountingProbe::default());
        let codebase_agent = Arc::new(EchoCodebaseAgent::default());
        let browser = Arc::new(BrowserSessions::new(Arc::clone(&backend)));

        let state: AppState<MockBrowser> = AppState {
            browser: Arc::clone(&browser),
            codebase: Arc::new(CodebaseSessions::new(probe.clone())),
            browser_agent: Arc::new(EchoBrowserAgent),
            codebase_agent: codebase_agent.clone(),
        };
        let app = api::create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            backend,
            probe,
            codebase_agent,
            browser,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, String) {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .delete(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }
}

fn browser_flow(user_id: &str, website_url: &str) -> Value {
    json!({
        "user_id": user_id,
        "metadata": { "website_url": website_url },
        "prompt": "open the pricing page",
    })
}

fn codebase_flow(user_id: &str, project_address: &str) -> Value {
    json!({
        "user_id": user_id,
        "project": { "project_address": project_address, "metadata": { "v": 1 } },
        "prompt": "add a README",
    })
}

/// Test that the health endpoint answers
#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "ok"}));
}

/// Test the browser flow: a context is created once and reused on later calls
#[tokio::test]
async fn test_browser_context_flow() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post("/browser/context_flow", browser_flow("alice", "https://example.com"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"]["context"], json!({"id": 0}));
    assert_eq!(body["history"]["website_url"], "https://example.com");
    assert_eq!(body["history"]["prompt"], "open the pricing page");

    // Second call with a new site reuses the context and updates the metadata
    let (status, body) = server
        .post("/browser/context_flow", browser_flow("alice", "https://example.org"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"]["context"], json!({"id": 0}));
    assert_eq!(body["history"]["website_url"], "https://example.org");
    assert_eq!(server.backend.created(), 1);
}

/// Test that a browser create failure renders as a 500 with the operation kind
#[tokio::test]
async fn test_browser_flow_create_failure() {
    let server = TestServer::start().await;
    server.backend.set_fail_create(true);

    let (status, body) = server
        .post("/browser/context_flow", browser_flow("bob", "https://example.com"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["operation"], "add_user_context_failed");
    assert_eq!(body["user_id"], "bob");
    assert_eq!(body["error"], "Failed to add user context for 'bob'.");
    assert_eq!(body["details"], "browser unavailable");
}

/// Test the codebase flow: readiness is checked once, then the agent runs
#[tokio::test]
async fn test_codebase_basic_flow() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post("/codebase/basic_flow", codebase_flow("alice", "http://ok.test"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "http://ok.test <- add a README");

    let (status, _) = server
        .post("/codebase/basic_flow", codebase_flow("alice", "http://ok.test"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.probe.calls(), 1);
}

/// Test that readiness failures map to 503 and 502
#[tokio::test]
async fn test_codebase_flow_readiness_failures() {
    let server = TestServer::start().await;
    server.probe.answer("http://bad", Readiness::NotReady);
    server.probe.answer("http://down", Readiness::Unreachable);

    let (status, body) = server
        .post("/codebase/basic_flow", codebase_flow("u1", "http://bad"))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["operation"], "add_user_project_health_check_failed");
    assert_eq!(body["error"], "Health check failed for project: http://bad");
    assert_eq!(body["project_address"], "http://bad");

    let (status, body) = server
        .post("/codebase/basic_flow", codebase_flow("u1", "http://down"))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["operation"], "add_user_project_http_error");
    assert_eq!(body["project_address"], "http://down");
}

/// Test that a devbox answering its health check with 503 is reported as an HTTP error
#[tokio::test]
async fn test_codebase_flow_devbox_error_status() {
    let health = axum::Router::new().route(
        "/galatea/health",
        axum::routing::get(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let devbox = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, health).await.unwrap();
    });

    let backend = Arc::new(MockBrowser::default());
    let state: AppState<MockBrowser> = AppState {
        browser: Arc::new(BrowserSessions::new(backend)),
        codebase: Arc::new(CodebaseSessions::new(Arc::new(HttpReadinessProbe::default()))),
        browser_agent: Arc::new(EchoBrowserAgent),
        codebase_agent: Arc::new(EchoCodebaseAgent::default()),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, api::create_router(state)).await.unwrap();
    });

    let response = reqwest::Client::new()
        .post(format!("{}/codebase/basic_flow", base))
        .json(&codebase_flow("u1", &devbox))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["operation"], "add_user_project_http_error");
    assert_eq!(body["project_address"], devbox.as_str());
    assert!(body["details"].as_str().unwrap().contains("503"));
}

/// Test that an agent failure is a 502 while the project stays registered
#[tokio::test]
async fn test_codebase_agent_failure() {
    let server = TestServer::start().await;
    server.codebase_agent.fail.store(true, Ordering::SeqCst);

    let (status, body) = server
        .post("/codebase/basic_flow", codebase_flow("u1", "http://ok.test"))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["operation"], "codebase_agent");

    let (_, sessions) = server.get("/sessions").await;
    let sessions: Value = serde_json::from_str(&sessions).unwrap();
    assert_eq!(sessions["codebase"][0]["user_id"], "u1");
}

/// Test the sessions listing and explicit eviction
#[tokio::test]
async fn test_sessions_and_eviction() {
    let server = TestServer::start().await;
    for user in ["carol", "alice"] {
        server
            .post("/browser/context_flow", browser_flow(user, "https://example.com"))
            .await;
    }
    server
        .post("/codebase/basic_flow", codebase_flow("alice", "http://ok.test"))
        .await;

    let (status, body) = server.get("/sessions").await;
    assert_eq!(status, StatusCode::OK);
    let sessions: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(sessions["browser_closing"], false);
    assert_eq!(sessions["browser"][0]["user_id"], "alice");
    assert_eq!(sessions["browser"][1]["user_id"], "carol");
    assert_eq!(sessions["codebase"][0]["project_address"], "http://ok.test");
    assert_eq!(sessions["codebase"][0]["metadata"], json!({"v": 1}));

    let (status, _) = server.delete("/browser/sessions/carol").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!server.browser.snapshot().contains("carol"));
    assert_eq!(server.backend.closed(), 1);

    let (status, _) = server.delete("/codebase/projects/alice").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = server.delete("/codebase/projects/alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["operation"], "remove_user_project_not_found");
    assert_eq!(body["error"], "User project for user_id 'alice' not found for removal.");

    let (status, body) = server.delete("/browser/sessions/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["operation"], "remove_user_context_not_found");
}

/// Test that adds after shutdown are refused through the API
#[tokio::test]
async fn test_browser_flow_after_shutdown() {
    let server = TestServer::start().await;
    server.browser.shutdown().await.unwrap();

    let (status, body) = server
        .post("/browser/context_flow", browser_flow("dave", "https://example.com"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["details"], "browser is shutting down");

    let (_, sessions) = server.get("/sessions").await;
    let sessions: Value = serde_json::from_str(&sessions).unwrap();
    assert_eq!(sessions["browser_closing"], true);
}

/// Test that the metrics endpoint exposes request counters
#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::start().await;
    server.get("/health").await;

    let (status, body) = server.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("aim_api_requests_total"));
    assert!(body.contains("route=\"/health\""));
}
