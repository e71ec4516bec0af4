//! Remote browser agent
//!
//! The browser automation itself runs in a separate service. We send it the
//! user's context handle, the target site and the prompt, and get back the
//! JSON history of what the agent did.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{check_status, AgentError, BrowserAgent};

#[derive(Serialize)]
struct RunRequest<'a, C> {
    context: &'a C,
    website_url: &'a str,
    prompt: &'a str,
}

/// Agent that POSTs `{context, website_url, prompt}` as JSON to a fixed URL
#[derive(Debug, Clone)]
pub struct RemoteBrowserAgent {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RemoteBrowserAgent {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C> BrowserAgent<C> for RemoteBrowserAgent
where
    C: Serialize + Send + Sync,
{
    async fn run(&self, context: &C, website_url: &str, prompt: &str) -> Result<Value, AgentError> {
        debug!(url = %self.url, website_url, "Invoking browser agent");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&RunRequest {
                context,
                website_url,
                prompt,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.url, error = %e, "Browser agent unreachable");
                AgentError::from(e)
            })?;

        let history = check_status(response).await?.json::<Value>().await?;
        Ok(history)
    }
}
