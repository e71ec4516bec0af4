//! Browser backend - the shared browser process and its per-user contexts
//!
//! The session registry never talks to a browser directly. It goes through
//! [`BrowserBackend`], which has three operations:
//!
//! ```text
//! create_context(config) ──► Context      (one per user)
//! close_context(context)                  (on removal / eviction)
//! close()                                 (once, at process shutdown)
//! ```
//!
//! [`DevToolsBrowser`] implements it over the Chrome DevTools HTTP endpoints.
//! Tests use in-memory mocks.

pub mod devtools;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::Fault;

pub use devtools::{DevToolsBrowser, DevToolsTarget};

/// Default desktop Chrome user agent for new contexts
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Settings applied to a newly created browser context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub window_width: u32,
    pub window_height: u32,
    pub locale: String,
    pub user_agent: String,
    /// Domains the agent may navigate to (empty = unrestricted)
    pub allowed_domains: Vec<String>,
    /// Seconds to wait for a page load before giving up
    pub maximum_wait_page_load_time: f64,
    pub highlight_elements: bool,
    pub keep_alive: bool,
    pub save_recording_path: Option<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_width: 1920,
            window_height: 1080,
            locale: "en-US".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_domains: Vec::new(),
            maximum_wait_page_load_time: 10.0,
            highlight_elements: true,
            keep_alive: true,
            save_recording_path: None,
        }
    }
}

/// The external browser the registry creates contexts in
#[async_trait]
pub trait BrowserBackend: Send + Sync + 'static {
    /// Handle to one user's isolated browsing context
    type Context: Clone + Send + Sync + std::fmt::Debug + 'static;

    async fn create_context(&self, config: &ContextConfig) -> Result<Self::Context, Fault>;

    async fn close_context(&self, context: &Self::Context) -> Result<(), Fault>;

    /// Close the shared browser itself
    async fn close(&self) -> Result<(), Fault>;
}
