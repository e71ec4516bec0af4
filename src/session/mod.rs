//! User session lifecycle
//!
//! Per-user resources (browser contexts, devbox projects) are held in
//! immutable registry snapshots. Every transition is a function from one
//! snapshot to a new snapshot or a typed error; the session services publish
//! successful results into a [`SnapshotCell`] with a single swap, so readers
//! only ever see a whole snapshot.
//!
//! ```text
//!  HTTP API ──► BrowserSessions ──► BrowserRegistry ──► BrowserBackend
//!      │                                               (create/close context)
//!      └──────► CodebaseSessions ─► CodebaseRegistry ─► ReadinessProbe
//!                      ▲                                (GET /galatea/health)
//!  Reaper ─────────────┘ (evicts idle users on an interval)
//! ```

pub mod browser;
pub mod codebase;
pub mod error;
pub mod reaper;
pub mod snapshot;

pub use browser::{BrowserRegistry, BrowserSessions, UserMetadata};
pub use codebase::{CodebaseRegistry, CodebaseSessions, ProjectMetadata, UserProject};
pub use error::{BrowserError, BrowserOperation, CodebaseError, CodebaseOperation, Fault};
pub use reaper::{Reaper, ReaperConfig, SweepReport};
pub use snapshot::SnapshotCell;
