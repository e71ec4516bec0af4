//! Browser session registry
//!
//! Maps each user to one browser context plus the metadata the browser agent
//! needs (the site it works on, when the user was last active).
//!
//! [`BrowserRegistry`] is an immutable snapshot: every operation returns a new
//! registry or a [`BrowserError`] and leaves `self` untouched.
//! [`BrowserSessions`] owns the process-wide current snapshot and publishes
//! the result of each successful transition.
//!
//! # Lifecycle of one user
//!
//! ```text
//!   add_or_refresh ──(new user)──► create_context ──► entry { context, metadata }
//!        │                                                   │
//!        └──(known user)──► metadata refreshed ◄─────────────┤
//!                                                            │
//!   remove / reaper ──► close_context ──ok──► entry dropped  │
//!                             └──err──► entry kept (still live)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{BrowserError, BrowserOperation};
use super::snapshot::SnapshotCell;
use crate::browser::{BrowserBackend, ContextConfig};
use crate::metrics::{ACTIVE_SESSIONS, REGISTRY_ERRORS};

/// What the browser agent needs to know about a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub website_url: String,
    #[serde(default = "Utc::now")]
    pub last_active_timestamp: DateTime<Utc>,
}

impl UserMetadata {
    pub fn new(website_url: impl Into<String>) -> Self {
        Self::at(website_url, Utc::now())
    }

    pub fn at(website_url: impl Into<String>, last_active_timestamp: DateTime<Utc>) -> Self {
        Self {
            website_url: website_url.into(),
            last_active_timestamp,
        }
    }
}

/// A user's context and metadata, always stored together
///
/// The context sits behind an `Arc` so a removal can tell whether the entry it
/// closed is still the one published.
#[derive(Debug, Clone)]
struct BrowserEntry<C> {
    context: Arc<C>,
    metadata: UserMetadata,
}

/// Immutable snapshot of all users' browser contexts
pub struct BrowserRegistry<B: BrowserBackend> {
    browser: Arc<B>,
    entries: HashMap<String, BrowserEntry<B::Context>>,
}

impl<B: BrowserBackend> BrowserRegistry<B> {
    /// Empty registry around the shared browser
    pub fn new(browser: Arc<B>) -> Self {
        Self {
            browser,
            entries: HashMap::new(),
        }
    }

    pub fn browser(&self) -> &Arc<B> {
        &self.browser
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    /// Users that currently hold a context
    pub fn context_user_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Users that currently have metadata (same set as `context_user_ids`)
    pub fn metadata_user_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All (user, metadata) pairs
    pub fn metadata(&self) -> impl Iterator<Item = (&str, &UserMetadata)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), &entry.metadata))
    }

    /// Add a context for a new user, or refresh a known user's metadata
    pub async fn add_or_refresh(
        &self,
        user_id: &str,
        config: &ContextConfig,
        metadata: UserMetadata,
    ) -> Result<Self, BrowserError> {
        self.add_or_refresh_at(user_id, config, metadata, Utc::now()).await
    }

    /// [`add_or_refresh`](Self::add_or_refresh) with an explicit "now"
    ///
    /// The stored metadata is always stamped with `now`, whatever timestamp
    /// the caller passed in.
    pub async fn add_or_refresh_at(
        &self,
        user_id: &str,
        config: &ContextConfig,
        metadata: UserMetadata,
        now: DateTime<Utc>,
    ) -> Result<Self, BrowserError> {
        let stamped = UserMetadata::at(metadata.website_url, now);

        match self.refreshed(user_id, &stamped) {
            Refresh::Unchanged => Ok(self.clone()),
            Refresh::Changed(next) => Ok(next),
            Refresh::Unknown => {
                let entry = self.create_entry(user_id, config, stamped).await?;
                Ok(self.with_entry(user_id, entry))
            }
        }
    }

    pub fn get_context(&self, user_id: &str) -> Result<B::Context, BrowserError> {
        self.entries
            .get(user_id)
            .map(|entry| entry.context.as_ref().clone())
            .ok_or_else(|| {
                BrowserError::new(
                    BrowserOperation::GetUserContextNotFound,
                    format!("User context for '{}' not found.", user_id),
                )
                .with_user(user_id)
            })
    }

    pub fn get_metadata(&self, user_id: &str) -> Result<UserMetadata, BrowserError> {
        self.entries
            .get(user_id)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| {
                BrowserError::new(
                    BrowserOperation::GetUserMetadataNotFound,
                    format!("User metadata for '{}' not found.", user_id),
                )
                .with_user(user_id)
            })
    }

    /// Close a user's context and drop it from the registry
    ///
    /// If the close fails the entry stays: a handle is never forgotten
    /// without a confirmed close.
    pub async fn remove(&self, user_id: &str) -> Result<Self, BrowserError> {
        self.close_entry(user_id).await?;
        let mut next = self.clone();
        next.entries.remove(user_id);
        Ok(next)
    }

    /// Replace a user's metadata (timestamp included) as given
    pub fn update_metadata(&self, user_id: &str, metadata: UserMetadata) -> Result<Self, BrowserError> {
        if !self.entries.contains_key(user_id) {
            return Err(BrowserError::new(
                BrowserOperation::UpdateUserMetadataNotFound,
                format!("User '{}' not found for metadata update.", user_id),
            )
            .with_user(user_id));
        }

        Ok(self.with_metadata(user_id, metadata))
    }

    /// Close the shared browser
    pub async fn shutdown(&self) -> Result<String, BrowserError> {
        self.browser.close().await.map_err(|e| {
            BrowserError::new(BrowserOperation::ShutdownBrowser, "Failed to close browser.").with_details(e)
        })?;
        Ok("Browser closed successfully".to_string())
    }

    fn refreshed(&self, user_id: &str, stamped: &UserMetadata) -> Refresh<Self> {
        match self.entries.get(user_id) {
            None => Refresh::Unknown,
            Some(existing) if existing.metadata == *stamped => Refresh::Unchanged,
            Some(_) => {
                debug!(user_id, website_url = %stamped.website_url, "Refreshing browser metadata");
                Refresh::Changed(self.with_metadata(user_id, stamped.clone()))
            }
        }
    }

    async fn create_entry(
        &self,
        user_id: &str,
        config: &ContextConfig,
        metadata: UserMetadata,
    ) -> Result<BrowserEntry<B::Context>, BrowserError> {
        let context = self.browser.create_context(config).await.map_err(|e| {
            BrowserError::new(
                BrowserOperation::AddUserContextFailed,
                format!("Failed to add user context for '{}'.", user_id),
            )
            .with_user(user_id)
            .with_details(e)
        })?;

        info!(user_id, website_url = %metadata.website_url, "Browser context created");
        Ok(BrowserEntry {
            context: Arc::new(context),
            metadata,
        })
    }

    /// Close a user's context, returning the handle that was closed
    async fn close_entry(&self, user_id: &str) -> Result<Arc<B::Context>, BrowserError> {
        let entry = self.entries.get(user_id).ok_or_else(|| {
            BrowserError::new(
                BrowserOperation::RemoveUserContextNotFound,
                format!("User context for '{}' not found.", user_id),
            )
            .with_user(user_id)
        })?;

        self.browser.close_context(&entry.context).await.map_err(|e| {
            BrowserError::new(
                BrowserOperation::RemoveUserContextFailed,
                format!("Failed to remove user context for '{}'.", user_id),
            )
            .with_user(user_id)
            .with_details(e)
        })?;

        info!(user_id, "Browser context closed");
        Ok(Arc::clone(&entry.context))
    }

    fn with_entry(&self, user_id: &str, entry: BrowserEntry<B::Context>) -> Self {
        let mut next = self.clone();
        next.entries.insert(user_id.to_string(), entry);
        next
    }

    fn with_metadata(&self, user_id: &str, metadata: UserMetadata) -> Self {
        let mut next = self.clone();
        if let Some(entry) = next.entries.get_mut(user_id) {
            entry.metadata = metadata;
        }
        next
    }

    /// Drop `user_id` if it still holds exactly `context`
    fn without(&self, user_id: &str, context: &Arc<B::Context>) -> Option<Self> {
        let entry = self.entries.get(user_id)?;
        if !Arc::ptr_eq(&entry.context, context) {
            return None;
        }
        let mut next = self.clone();
        next.entries.remove(user_id);
        Some(next)
    }
}

/// Outcome of refreshing a user's metadata in one snapshot
enum Refresh<R> {
    Unknown,
    Unchanged,
    Changed(R),
}

impl<B: BrowserBackend> Clone for BrowserRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            browser: Arc::clone(&self.browser),
            entries: self.entries.clone(),
        }
    }
}

impl<B: BrowserBackend> std::fmt::Debug for BrowserRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserRegistry")
            .field("users", &self.entries.len())
            .finish()
    }
}

/// Process-wide browser sessions: the current snapshot plus shutdown state
pub struct BrowserSessions<B: BrowserBackend> {
    cell: SnapshotCell<BrowserRegistry<B>>,
    closing: AtomicBool,
}

impl<B: BrowserBackend> BrowserSessions<B> {
    pub fn new(browser: Arc<B>) -> Self {
        Self {
            cell: SnapshotCell::new(BrowserRegistry::new(browser)),
            closing: AtomicBool::new(false),
        }
    }

    /// Current snapshot, for read-only iteration
    pub fn snapshot(&self) -> Arc<BrowserRegistry<B>> {
        self.cell.load()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Add a context for a new user, or refresh a known user
    ///
    /// The context is created against a loaded snapshot, then inserted into
    /// whatever snapshot is current. If another request registered the same
    /// user meanwhile, the extra context is closed and the user refreshed.
    pub async fn add_or_refresh(
        &self,
        user_id: &str,
        config: &ContextConfig,
        metadata: UserMetadata,
    ) -> Result<Arc<BrowserRegistry<B>>, BrowserError> {
        if self.is_closing() {
            return Err(record(
                BrowserError::new(
                    BrowserOperation::AddUserContextFailed,
                    format!("Failed to add user context for '{}'.", user_id),
                )
                .with_user(user_id)
                .with_details("browser is shutting down"),
            ));
        }

        let stamped = UserMetadata::new(metadata.website_url);
        if let Some(current) = self.refresh_known(user_id, &stamped) {
            return Ok(current);
        }

        let entry = self
            .cell
            .load()
            .create_entry(user_id, config, stamped.clone())
            .await
            .map_err(record)?;
        let context = Arc::clone(&entry.context);

        let inserted = self.cell.try_modify(|current| {
            if current.contains(user_id) {
                return Err(());
            }
            Ok(Some(current.with_entry(user_id, entry.clone())))
        });
        if let Ok(next) = inserted {
            ACTIVE_SESSIONS.with_label_values(&["browser"]).set(next.len() as i64);
            return Ok(next);
        }

        warn!(user_id, "User registered concurrently, closing the extra context");
        let current = self.cell.load();
        if let Err(e) = current.browser().close_context(&context).await {
            warn!(user_id, error = %e, "Failed to close extra browser context");
        }
        Ok(self.refresh_known(user_id, &stamped).unwrap_or(current))
    }

    pub fn get_context(&self, user_id: &str) -> Result<B::Context, BrowserError> {
        self.cell.load().get_context(user_id)
    }

    pub fn get_metadata(&self, user_id: &str) -> Result<UserMetadata, BrowserError> {
        self.cell.load().get_metadata(user_id)
    }

    /// Close a user's context, then drop it from the current snapshot
    ///
    /// Users added while the close was pending stay published.
    pub async fn remove(&self, user_id: &str) -> Result<Arc<BrowserRegistry<B>>, BrowserError> {
        let closed = self.cell.load().close_entry(user_id).await.map_err(record)?;
        let next = self.cell.modify(|current| current.without(user_id, &closed));
        ACTIVE_SESSIONS.with_label_values(&["browser"]).set(next.len() as i64);
        Ok(next)
    }

    pub fn update_metadata(
        &self,
        user_id: &str,
        metadata: UserMetadata,
    ) -> Result<Arc<BrowserRegistry<B>>, BrowserError> {
        let next = self
            .cell
            .try_update(|current| current.update_metadata(user_id, metadata.clone()))
            .map_err(record)?;
        ACTIVE_SESSIONS.with_label_values(&["browser"]).set(next.len() as i64);
        Ok(next)
    }

    /// Close the shared browser, once
    ///
    /// New contexts are refused as soon as shutdown starts. On success the
    /// published snapshot is emptied, since the contexts died with the browser.
    pub async fn shutdown(&self) -> Result<String, BrowserError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Err(record(BrowserError::new(
                BrowserOperation::CloseMainBrowser,
                "Browser already shut down.",
            )));
        }

        let current = self.cell.load();
        let message = current.shutdown().await.map_err(record)?;
        self.cell
            .store(Arc::new(BrowserRegistry::new(Arc::clone(current.browser()))));
        ACTIVE_SESSIONS.with_label_values(&["browser"]).set(0);
        info!(dropped_contexts = current.len(), "Browser shut down");
        Ok(message)
    }

    /// Refresh a known user on the current snapshot; `None` if unknown
    fn refresh_known(&self, user_id: &str, stamped: &UserMetadata) -> Option<Arc<BrowserRegistry<B>>> {
        self.cell
            .try_modify(|current| match current.refreshed(user_id, stamped) {
                Refresh::Unknown => Err(()),
                Refresh::Unchanged => Ok(None),
                Refresh::Changed(next) => Ok(Some(next)),
            })
            .ok()
    }
}

impl<B: BrowserBackend> std::fmt::Debug for BrowserSessions<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSessions")
            .field("current", &self.cell.load())
            .field("closing", &self.is_closing())
            .finish()
    }
}

fn record(err: BrowserError) -> BrowserError {
    REGISTRY_ERRORS.with_label_values(&[err.operation.as_str()]).inc();
    err
}
