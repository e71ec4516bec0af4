//! Devbox endpoints
//!
//! A devbox is a remote development sandbox running the galatea service.
//! The orchestrator only uses two of its HTTP endpoints:
//!
//! - `GET  {address}/galatea/health` - readiness probe before a project is registered
//! - `POST {address}/galatea/invoke-codex` - hand a prompt to the codebase agent

pub mod probe;

pub use probe::{HttpReadinessProbe, ReadinessProbe};

pub const HEALTH_PATH: &str = "/galatea/health";
pub const INVOKE_CODEX_PATH: &str = "/galatea/invoke-codex";

/// Join a project address and an endpoint path without doubling slashes
pub fn endpoint(project_address: &str, path: &str) -> String {
    format!("{}{}", project_address.trim_end_matches('/'), path)
}
