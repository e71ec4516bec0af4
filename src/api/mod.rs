//! HTTP API
//!
//! Thin request layer over the session services and the agents:
//!
//! | Route                               | Purpose                                  |
//! |-------------------------------------|------------------------------------------|
//! | `GET /health`                       | liveness                                 |
//! | `POST /browser/context_flow`        | ensure a browser context, run the agent  |
//! | `POST /codebase/basic_flow`         | ensure a ready project, run the agent    |
//! | `GET /sessions`                     | current snapshots, sorted by user        |
//! | `DELETE /browser/sessions/:user_id` | close a user's browser context           |
//! | `DELETE /codebase/projects/:user_id`| drop a user's project                    |
//! | `GET /metrics`                      | Prometheus text exposition               |
//!
//! Both flows refresh the user's activity timestamp, so users who keep
//! sending prompts are never reaped.

pub mod error;

use std::sync::Arc;

use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::agent::{BrowserAgent, CodebaseAgent};
use crate::browser::{BrowserBackend, ContextConfig};
use crate::metrics::{self, API_REQUESTS};
use crate::session::{BrowserSessions, CodebaseSessions, ProjectMetadata, UserMetadata};

pub use error::{ApiError, ErrorBody};

/// Shared state behind every handler
pub struct AppState<B: BrowserBackend> {
    pub browser: Arc<BrowserSessions<B>>,
    pub codebase: Arc<CodebaseSessions>,
    pub browser_agent: Arc<dyn BrowserAgent<B::Context>>,
    pub codebase_agent: Arc<dyn CodebaseAgent>,
}

impl<B: BrowserBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            browser: Arc::clone(&self.browser),
            codebase: Arc::clone(&self.codebase),
            browser_agent: Arc::clone(&self.browser_agent),
            codebase_agent: Arc::clone(&self.codebase_agent),
        }
    }
}

/// Request body for `POST /browser/context_flow`
#[derive(Debug, Deserialize)]
pub struct BrowserFlowRequest {
    pub user_id: String,
    #[serde(default)]
    pub context_config: ContextConfig,
    pub metadata: UserMetadata,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct BrowserFlowResponse {
    pub history: Value,
}

/// Project part of a codebase flow request
#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    pub project_address: String,
    #[serde(default)]
    pub metadata: Option<ProjectMetadata>,
}

/// Request body for `POST /codebase/basic_flow`
#[derive(Debug, Deserialize)]
pub struct CodebaseFlowRequest {
    pub user_id: String,
    pub project: ProjectRequest,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct CodebaseFlowResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct BrowserSessionView {
    pub user_id: String,
    pub website_url: String,
    pub last_active_timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CodebaseSessionView {
    pub user_id: String,
    pub project_address: String,
    pub metadata: Option<ProjectMetadata>,
    pub last_active_timestamp: DateTime<Utc>,
}

/// Response body for `GET /sessions`
#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub browser_closing: bool,
    pub browser: Vec<BrowserSessionView>,
    pub codebase: Vec<CodebaseSessionView>,
}

/// Create the API router
pub fn create_router<B: BrowserBackend>(state: AppState<B>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/browser/context_flow", post(browser_context_flow::<B>))
        .route("/codebase/basic_flow", post(codebase_basic_flow::<B>))
        .route("/sessions", get(list_sessions::<B>))
        .route("/browser/sessions/:user_id", delete(remove_browser_session::<B>))
        .route("/codebase/projects/:user_id", delete(remove_codebase_project::<B>))
        .route("/metrics", get(prometheus_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Count every routed request by matched path and status
async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    API_REQUESTS
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();
    response
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn browser_context_flow<B: BrowserBackend>(
    State(state): State<AppState<B>>,
    Json(request): Json<BrowserFlowRequest>,
) -> Result<Json<BrowserFlowResponse>, ApiError> {
    let trace_id = Uuid::now_v7().to_string();
    let span = info_span!(
        "browser_context_flow",
        trace_id = %trace_id,
        user_id = %request.user_id,
        otel.name = "browser_context_flow"
    );

    async move {
        let user_id = request.user_id.as_str();
        state
            .browser
            .add_or_refresh(user_id, &request.context_config, request.metadata)
            .await?;

        let context = state.browser.get_context(user_id)?;
        let metadata = state.browser.get_metadata(user_id)?;

        let history = state
            .browser_agent
            .run(&context, &metadata.website_url, &request.prompt)
            .await
            .map_err(|source| ApiError::Agent {
                operation: "browser_agent",
                user_id: user_id.to_string(),
                source,
            })?;

        info!(website_url = %metadata.website_url, "Browser flow completed");
        Ok::<_, ApiError>(Json(BrowserFlowResponse { history }))
    }
    .instrument(span)
    .await
}

async fn codebase_basic_flow<B: BrowserBackend>(
    State(state): State<AppState<B>>,
    Json(request): Json<CodebaseFlowRequest>,
) -> Result<Json<CodebaseFlowResponse>, ApiError> {
    let trace_id = Uuid::now_v7().to_string();
    let span = info_span!(
        "codebase_basic_flow",
        trace_id = %trace_id,
        user_id = %request.user_id,
        project_address = %request.project.project_address,
        otel.name = "codebase_basic_flow"
    );

    async move {
        let user_id = request.user_id.as_str();
        state
            .codebase
            .add_or_refresh(
                user_id,
                &request.project.project_address,
                request.project.metadata,
            )
            .await?;

        let project = state.codebase.get(user_id)?;
        let code = state
            .codebase_agent
            .run(&project.project_address, &request.prompt)
            .await
            .map_err(|source| ApiError::Agent {
                operation: "codebase_agent",
                user_id: user_id.to_string(),
                source,
            })?;

        info!(response_len = code.len(), "Codebase flow completed");
        Ok::<_, ApiError>(Json(CodebaseFlowResponse { code }))
    }
    .instrument(span)
    .await
}

async fn list_sessions<B: BrowserBackend>(
    State(state): State<AppState<B>>,
) -> Json<SessionsResponse> {
    let browser_snapshot = state.browser.snapshot();
    let mut browser: Vec<BrowserSessionView> = browser_snapshot
        .metadata()
        .map(|(user_id, meta)| BrowserSessionView {
            user_id: user_id.to_string(),
            website_url: meta.website_url.clone(),
            last_active_timestamp: meta.last_active_timestamp,
        })
        .collect();
    browser.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let codebase_snapshot = state.codebase.snapshot();
    let mut codebase: Vec<CodebaseSessionView> = codebase_snapshot
        .projects()
        .map(|(user_id, project)| CodebaseSessionView {
            user_id: user_id.to_string(),
            project_address: project.project_address.clone(),
            metadata: project.metadata.clone(),
            last_active_timestamp: project.last_active_timestamp,
        })
        .collect();
    codebase.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    Json(SessionsResponse {
        browser_closing: state.browser.is_closing(),
        browser,
        codebase,
    })
}

async fn remove_browser_session<B: BrowserBackend>(
    State(state): State<AppState<B>>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.browser.remove(&user_id).await?;
    info!(user_id = %user_id, "Browser session removed on request");
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_codebase_project<B: BrowserBackend>(
    State(state): State<AppState<B>>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.codebase.remove(&user_id)?;
    info!(user_id = %user_id, "Codebase project removed on request");
    Ok(StatusCode::NO_CONTENT)
}

async fn prometheus_metrics() -> Response {
    match metrics::render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
