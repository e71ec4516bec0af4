//! Server configuration
//!
//! Every setting has a default and can be overridden with an `AIM_*`
//! environment variable.
//!
//! | Variable                        | Default                     |
//! |---------------------------------|-----------------------------|
//! | `AIM_BIND_ADDR`                 | `0.0.0.0:3050`              |
//! | `AIM_INACTIVITY_THRESHOLD_SECS` | `3600`                      |
//! | `AIM_REAP_INTERVAL_SECS`        | `300`                       |
//! | `AIM_HEALTH_TIMEOUT_SECS`       | `5`                         |
//! | `AIM_AGENT_TIMEOUT_SECS`        | `60`                        |
//! | `AIM_DEVTOOLS_URL`              | `http://127.0.0.1:9222`     |
//! | `AIM_BROWSER_AGENT_URL`         | `http://127.0.0.1:3060/run` |
//! | `AIM_OTLP_ENDPOINT`             | unset (no span export)      |
//! | `AIM_LOG_JSON`                  | `false`                     |

use std::net::SocketAddr;
use std::time::Duration;

use crate::session::ReaperConfig;

/// Error for a malformed environment variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
    pub reason: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid value {:?} for {}: {}",
            self.value, self.variable, self.reason
        )
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the `aim` server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the HTTP API listens on
    pub bind_addr: SocketAddr,
    /// Users idle for longer than this are evicted
    pub inactivity_threshold: Duration,
    /// Pause between reaper sweeps
    pub reap_interval: Duration,
    /// Devbox readiness probe timeout
    pub health_timeout: Duration,
    /// Timeout for agent calls
    pub agent_timeout: Duration,
    /// Chrome DevTools HTTP endpoint
    pub devtools_url: String,
    /// Remote browser agent endpoint
    pub browser_agent_url: String,
    /// OTLP collector; `None` disables span export
    pub otlp_endpoint: Option<String>,
    /// JSON log lines instead of text
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3050)),
            inactivity_threshold: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(300),
            health_timeout: Duration::from_secs(5),
            agent_timeout: Duration::from_secs(60),
            devtools_url: "http://127.0.0.1:9222".to_string(),
            browser_agent_url: "http://127.0.0.1:3060/run".to_string(),
            otlp_endpoint: None,
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("AIM_BIND_ADDR") {
            config.bind_addr = value.parse().map_err(|e: std::net::AddrParseError| ConfigError {
                variable: "AIM_BIND_ADDR",
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(secs) = seconds(&lookup, "AIM_INACTIVITY_THRESHOLD_SECS")? {
            config.inactivity_threshold = secs;
        }
        if let Some(secs) = seconds(&lookup, "AIM_REAP_INTERVAL_SECS")? {
            config.reap_interval = secs;
        }
        if let Some(secs) = seconds(&lookup, "AIM_HEALTH_TIMEOUT_SECS")? {
            config.health_timeout = secs;
        }
        if let Some(secs) = seconds(&lookup, "AIM_AGENT_TIMEOUT_SECS")? {
            config.agent_timeout = secs;
        }
        if let Some(url) = lookup("AIM_DEVTOOLS_URL") {
            config.devtools_url = url;
        }
        if let Some(url) = lookup("AIM_BROWSER_AGENT_URL") {
            config.browser_agent_url = url;
        }
        config.otlp_endpoint = lookup("AIM_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty());
        if let Some(value) = lookup("AIM_LOG_JSON") {
            config.log_json = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError {
                        variable: "AIM_LOG_JSON",
                        value,
                        reason: "expected a boolean".to_string(),
                    })
                }
            };
        }

        Ok(config)
    }

    pub fn reaper(&self) -> ReaperConfig {
        ReaperConfig {
            interval: self.reap_interval,
            inactivity_threshold: self.inactivity_threshold,
        }
    }
}

/// Parse a whole number of seconds; the reap interval must not be zero
fn seconds<F>(lookup: &F, variable: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(variable) else {
        return Ok(None);
    };
    let secs: u64 = value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError {
        variable,
        value: value.clone(),
        reason: e.to_string(),
    })?;
    if secs == 0 && variable == "AIM_REAP_INTERVAL_SECS" {
        return Err(ConfigError {
            variable,
            value,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Some(Duration::from_secs(secs)))
}
