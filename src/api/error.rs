//! Rendering of registry and agent errors as HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::agent::AgentError;
use crate::session::{BrowserError, BrowserOperation, CodebaseError, CodebaseOperation};

/// Error returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    Browser(BrowserError),
    Codebase(CodebaseError),
    /// The agent call failed after the session was ready
    Agent {
        operation: &'static str,
        user_id: String,
        source: AgentError,
    },
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub operation: String,
    pub user_id: Option<String>,
    /// Devbox address, for codebase errors that carry one
    pub project_address: Option<String>,
    pub details: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Browser(err) if err.operation.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Browser(err) => match err.operation {
                BrowserOperation::ShutdownBrowser | BrowserOperation::CloseMainBrowser => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Codebase(err) if err.operation.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Codebase(err) => match err.operation {
                CodebaseOperation::AddUserProjectHealthCheckFailed => StatusCode::SERVICE_UNAVAILABLE,
                CodebaseOperation::AddUserProjectHttpError => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Agent { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::Browser(err) => ErrorBody {
                error: err.message.clone(),
                operation: err.operation.as_str().to_string(),
                user_id: err.user_id.clone(),
                project_address: None,
                details: err.details.clone(),
            },
            ApiError::Codebase(err) => ErrorBody {
                error: err.message.clone(),
                operation: err.operation.as_str().to_string(),
                user_id: err.user_id.clone(),
                project_address: err.project_address.clone(),
                details: err.details.clone(),
            },
            ApiError::Agent {
                operation,
                user_id,
                source,
            } => ErrorBody {
                error: "Agent call failed".to_string(),
                operation: operation.to_string(),
                user_id: Some(user_id.clone()),
                project_address: None,
                details: Some(source.to_string()),
            },
        }
    }
}

impl From<BrowserError> for ApiError {
    fn from(err: BrowserError) -> Self {
        ApiError::Browser(err)
    }
}

impl From<CodebaseError> for ApiError {
    fn from(err: CodebaseError) -> Self {
        ApiError::Codebase(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
