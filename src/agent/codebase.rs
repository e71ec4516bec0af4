//! Codebase agent running inside the user's devbox

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::{check_status, AgentError, CodebaseAgent};
use crate::devbox::{endpoint, INVOKE_CODEX_PATH};

/// Default timeout for a codebase agent run
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct InvokeRequest<'a> {
    prompt: &'a str,
}

/// Agent that POSTs the prompt to `{address}/galatea/invoke-codex`
#[derive(Debug, Clone)]
pub struct DevboxAgent {
    client: reqwest::Client,
    timeout: Duration,
}

impl DevboxAgent {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for DevboxAgent {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_TIMEOUT)
    }
}

#[async_trait]
impl CodebaseAgent for DevboxAgent {
    async fn run(&self, project_address: &str, prompt: &str) -> Result<String, AgentError> {
        let url = endpoint(project_address, INVOKE_CODEX_PATH);
        debug!(url = %url, prompt_len = prompt.len(), "Invoking codebase agent");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&InvokeRequest { prompt })
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Codebase agent unreachable");
                AgentError::from(e)
            })?;

        let body = check_status(response).await?.text().await?;
        Ok(body)
    }
}
