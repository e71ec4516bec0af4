//! Chrome DevTools HTTP backend
//!
//! Talks to a Chromium started with `--remote-debugging-port`. Each user
//! context is a DevTools target opened on `about:blank`; the browser agent
//! attaches to it through the target's websocket URL.
//!
//! Endpoints used:
//! - `PUT /json/new?about:blank` - open a target
//! - `GET /json/close/{id}` - close a target

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BrowserBackend, ContextConfig};
use crate::session::Fault;

/// Timeout for individual DevTools HTTP calls
const DEVTOOLS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Target description returned by `/json/new`
#[derive(Debug, Deserialize)]
struct TargetInfo {
    id: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    web_socket_debugger_url: Option<String>,
}

/// A DevTools target owned by one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevToolsTarget {
    pub id: String,
    pub websocket_url: Option<String>,
    pub config: Arc<ContextConfig>,
}

/// Browser backend over the DevTools HTTP endpoints
pub struct DevToolsBrowser {
    base_url: String,
    client: reqwest::Client,
    /// Targets we opened and have not closed yet
    open_targets: Mutex<HashSet<String>>,
    closed: AtomicBool,
}

impl DevToolsBrowser {
    /// Create a backend for the DevTools server at `base_url`
    /// (e.g. "http://127.0.0.1:9222")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            open_targets: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of targets opened by this backend that are still open
    pub fn open_target_count(&self) -> usize {
        self.open_targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close_target(&self, id: &str) -> Result<(), Fault> {
        let endpoint = format!("{}/json/close/{}", self.base_url, id);
        self.client
            .get(&endpoint)
            .timeout(DEVTOOLS_REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl BrowserBackend for DevToolsBrowser {
    type Context = DevToolsTarget;

    async fn create_context(&self, config: &ContextConfig) -> Result<DevToolsTarget, Fault> {
        if self.is_closed() {
            return Err("browser is closed".into());
        }

        let endpoint = format!("{}/json/new?about:blank", self.base_url);
        let info: TargetInfo = self
            .client
            .put(&endpoint)
            .timeout(DEVTOOLS_REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(target_id = %info.id, "DevTools target opened");
        self.open_targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.id.clone());

        Ok(DevToolsTarget {
            id: info.id,
            websocket_url: info.web_socket_debugger_url,
            config: Arc::new(config.clone()),
        })
    }

    async fn close_context(&self, context: &DevToolsTarget) -> Result<(), Fault> {
        self.close_target(&context.id).await?;
        self.open_targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&context.id);
        debug!(target_id = %context.id, "DevTools target closed");
        Ok(())
    }

    async fn close(&self) -> Result<(), Fault> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err("browser already closed".into());
        }

        let targets: Vec<String> = self
            .open_targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        let mut failures = Vec::new();
        for id in &targets {
            if let Err(e) = self.close_target(id).await {
                warn!(target_id = %id, error = %e, "Failed to close DevTools target");
                failures.push(format!("{}: {}", id, e));
            }
        }

        if !failures.is_empty() {
            return Err(format!(
                "failed to close {} of {} targets ({})",
                failures.len(),
                targets.len(),
                failures.join("; ")
            )
            .into());
        }

        info!(targets = targets.len(), "DevTools browser closed");
        Ok(())
    }
}

impl std::fmt::Debug for DevToolsBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevToolsBrowser")
            .field("base_url", &self.base_url)
            .field("open_targets", &self.open_target_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
