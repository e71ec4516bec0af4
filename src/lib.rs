//! aim - agent instance manager
//!
//! Tracks per-user session state for LLM-driven agents (browser contexts,
//! devbox codebase projects) and evicts it after a period of inactivity.
//!
//! # Modules
//!
//! - `session` - immutable session registries, snapshot cell, inactivity reaper
//! - `browser` - browser backend seam and the Chrome DevTools implementation
//! - `devbox` - devbox endpoints and the readiness probe
//! - `agent` - seams to the external browser and codebase agents
//! - `api` - axum HTTP API
//! - `config` - environment-driven server configuration
//! - `metrics` - Prometheus metrics for observability
//! - `telemetry` - tracing-subscriber and OpenTelemetry setup
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use aim::{BrowserSessions, CodebaseSessions, DevToolsBrowser, HttpReadinessProbe, UserMetadata};
//!
//! let browser = Arc::new(BrowserSessions::new(Arc::new(DevToolsBrowser::new("http://127.0.0.1:9222"))));
//! browser
//!     .add_or_refresh("alice", &Default::default(), UserMetadata::new("https://example.com"))
//!     .await?;
//!
//! let codebase = CodebaseSessions::new(Arc::new(HttpReadinessProbe::default()));
//! codebase.add_or_refresh("alice", "http://devbox:8080", None).await?;
//! ```

pub mod agent;
pub mod api;
pub mod browser;
pub mod config;
pub mod devbox;
pub mod metrics;
pub mod session;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use browser::{BrowserBackend, ContextConfig, DevToolsBrowser};
pub use config::ServerConfig;
pub use devbox::{HttpReadinessProbe, ReadinessProbe};
pub use session::{
    BrowserError, BrowserSessions, CodebaseError, CodebaseSessions, Reaper, ReaperConfig,
    UserMetadata, UserProject,
};
