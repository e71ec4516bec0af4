//! Inactivity reaper
//!
//! Background task that evicts users who have not been active for longer
//! than the inactivity threshold. Browser contexts are closed through the
//! backend; codebase projects are simply dropped.
//!
//! ```text
//!   ┌──────────────┐  interval   ┌─────────────┐
//!   │ sleep / wait ├────────────►│ sweep(now)  │
//!   └──────▲───────┘             └──────┬──────┘
//!          │                            │ stale browser users  -> remove()
//!          │                            │ stale codebase users -> remove()
//!          └────────────────────────────┘
//!   cancel token fired while sleeping -> loop exits
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::browser::BrowserSessions;
use super::codebase::CodebaseSessions;
use crate::browser::BrowserBackend;
use crate::metrics::SESSIONS_REAPED;

/// Reaper timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Pause between sweeps
    pub interval: Duration,
    /// Users idle for longer than this are evicted
    pub inactivity_threshold: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            inactivity_threshold: Duration::from_secs(3600),
        }
    }
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub browser_removed: usize,
    pub browser_failed: usize,
    pub codebase_removed: usize,
    pub codebase_failed: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.browser_removed + self.codebase_removed
    }

    pub fn failed(&self) -> usize {
        self.browser_failed + self.codebase_failed
    }
}

pub struct Reaper<B: BrowserBackend> {
    browser: Arc<BrowserSessions<B>>,
    codebase: Arc<CodebaseSessions>,
    config: ReaperConfig,
}

impl<B: BrowserBackend> Reaper<B> {
    pub fn new(
        browser: Arc<BrowserSessions<B>>,
        codebase: Arc<CodebaseSessions>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            browser,
            codebase,
            config,
        }
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Evict every user idle since before `now - inactivity_threshold`
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.sweep_with(now, &CancellationToken::new()).await
    }

    async fn sweep_with(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(cutoff) = chrono::Duration::from_std(self.config.inactivity_threshold)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
        else {
            warn!(threshold = ?self.config.inactivity_threshold, "Inactivity threshold out of range, skipping sweep");
            return report;
        };

        let stale_browser: Vec<String> = self
            .browser
            .snapshot()
            .metadata()
            .filter(|(_, meta)| meta.last_active_timestamp < cutoff)
            .map(|(user_id, _)| user_id.to_string())
            .collect();

        for user_id in &stale_browser {
            if cancel.is_cancelled() {
                return report;
            }
            // The user may have been refreshed or removed since the scan
            let still_stale = self
                .browser
                .get_metadata(user_id)
                .map(|meta| meta.last_active_timestamp < cutoff)
                .unwrap_or(false);
            if !still_stale {
                continue;
            }

            match self.browser.remove(user_id).await {
                Ok(_) => {
                    info!(user_id = %user_id, "Evicted inactive browser session");
                    SESSIONS_REAPED.with_label_values(&["browser", "removed"]).inc();
                    report.browser_removed += 1;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to evict browser session");
                    SESSIONS_REAPED.with_label_values(&["browser", "failed"]).inc();
                    report.browser_failed += 1;
                }
            }
        }

        let stale_codebase: Vec<String> = self
            .codebase
            .snapshot()
            .projects()
            .filter(|(_, project)| project.last_active_timestamp < cutoff)
            .map(|(user_id, _)| user_id.to_string())
            .collect();

        for user_id in &stale_codebase {
            if cancel.is_cancelled() {
                return report;
            }
            let still_stale = self
                .codebase
                .get(user_id)
                .map(|project| project.last_active_timestamp < cutoff)
                .unwrap_or(false);
            if !still_stale {
                continue;
            }

            match self.codebase.remove(user_id) {
                Ok(_) => {
                    info!(user_id = %user_id, "Evicted inactive codebase project");
                    SESSIONS_REAPED.with_label_values(&["codebase", "removed"]).inc();
                    report.codebase_removed += 1;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to evict codebase project");
                    SESSIONS_REAPED.with_label_values(&["codebase", "failed"]).inc();
                    report.codebase_failed += 1;
                }
            }
        }

        report
    }

    /// Run sweeps forever in the background until `cancel` fires
    ///
    /// Each round sleeps first, then sweeps.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.config.interval.as_secs(),
                threshold_secs = self.config.inactivity_threshold.as_secs(),
                "Reaper started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.interval) => {}
                }

                let report = self.sweep_with(Utc::now(), &cancel).await;
                if report.removed() > 0 || report.failed() > 0 {
                    info!(
                        removed = report.removed(),
                        failed = report.failed(),
                        "Reaper sweep finished"
                    );
                } else {
                    debug!("Reaper sweep found nothing to evict");
                }
            }

            info!("Reaper stopped");
        })
    }
}

impl<B: BrowserBackend> std::fmt::Debug for Reaper<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper").field("config", &self.config).finish()
    }
}
