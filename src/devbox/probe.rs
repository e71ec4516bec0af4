//! Readiness probe for devbox projects
//!
//! A project is only registered for a user once its devbox answers the health
//! endpoint. The probe distinguishes two failure shapes, which the registry
//! reports as different error kinds:
//!
//! - `Ok(false)` - the devbox answered with a 2xx other than `200 OK`
//! - `Err(_)` - an error status (4xx/5xx), or no answer at all

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{endpoint, HEALTH_PATH};
use crate::metrics::READINESS_CHECK_DURATION;
use crate::session::Fault;

/// Default probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Decides whether a project address is ready to accept work
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn check(&self, project_address: &str) -> Result<bool, Fault>;
}

/// Probe that GETs `{address}/galatea/health`
#[derive(Clone)]
pub struct HttpReadinessProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpReadinessProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpReadinessProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn check(&self, project_address: &str) -> Result<bool, Fault> {
        let url = endpoint(project_address, HEALTH_PATH);
        let start = Instant::now();

        let result = self.client.get(&url).timeout(self.timeout).send().await;
        READINESS_CHECK_DURATION.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                let status = response.status();
                debug!(url = %url, status = status.as_u16(), "Readiness probe answered");
                let response = response.error_for_status().map_err(|e| {
                    warn!(url = %url, status = status.as_u16(), "Readiness probe got error status");
                    e
                })?;
                Ok(response.status() == reqwest::StatusCode::OK)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Readiness probe failed");
                Err(Box::new(e))
            }
        }
    }
}

impl std::fmt::Debug for HttpReadinessProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReadinessProbe")
            .field("timeout", &self.timeout)
            .finish()
    }
}
