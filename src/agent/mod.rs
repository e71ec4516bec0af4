//! Agent seams
//!
//! The orchestrator does not run agents itself. It hands a prompt plus the
//! user's session resource to an external agent and relays the result:
//!
//! ```text
//! POST /codebase/basic_flow ─► CodebaseSessions ─► CodebaseAgent
//!                                (project)          POST {devbox}/galatea/invoke-codex
//!
//! POST /browser/context_flow ─► BrowserSessions ─► BrowserAgent
//!                                (context)          POST {browser agent service}
//! ```

pub mod browser;
pub mod codebase;

use async_trait::async_trait;

pub use browser::RemoteBrowserAgent;
pub use codebase::DevboxAgent;

/// Runs a prompt against a user's devbox project
#[async_trait]
pub trait CodebaseAgent: Send + Sync {
    /// Returns the agent's raw response body
    async fn run(&self, project_address: &str, prompt: &str) -> Result<String, AgentError>;
}

/// Runs a prompt in a user's browser context
#[async_trait]
pub trait BrowserAgent<C: Send + Sync>: Send + Sync {
    /// Returns the agent's action history
    async fn run(
        &self,
        context: &C,
        website_url: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, AgentError>;
}

/// Error type for agent calls
#[derive(Debug)]
pub enum AgentError {
    /// The agent could not be reached (connect failure, timeout)
    Unreachable(String),
    /// The agent answered with a non-2xx status
    Rejected { status: u16, body: String },
    /// The agent answered with a body we could not use
    InvalidResponse(String),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Unreachable(msg) => write!(f, "Agent unreachable: {}", msg),
            AgentError::Rejected { status, body } => {
                write!(f, "Agent returned HTTP {}: {}", status, body)
            }
            AgentError::InvalidResponse(msg) => write!(f, "Invalid agent response: {}", msg),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AgentError::InvalidResponse(e.to_string())
        } else {
            AgentError::Unreachable(e.to_string())
        }
    }
}

/// Turn a non-2xx response into [`AgentError::Rejected`]
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::Rejected {
        status: status.as_u16(),
        body,
    })
}
