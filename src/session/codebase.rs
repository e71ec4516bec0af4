//! Codebase project registry
//!
//! Maps each user to the devbox project the codebase agent works against.
//! A project enters the registry only after its devbox passed a readiness
//! probe, and is probed again whenever its address or metadata change.
//! Re-adding identical data only refreshes the activity timestamp, without
//! touching the network.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::error::{CodebaseError, CodebaseOperation};
use super::snapshot::SnapshotCell;
use crate::devbox::ReadinessProbe;
use crate::metrics::{ACTIVE_SESSIONS, REGISTRY_ERRORS};

/// Free-form project metadata supplied by the caller
pub type ProjectMetadata = Map<String, Value>;

/// A user's devbox project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProject {
    pub project_address: String,
    #[serde(default)]
    pub metadata: Option<ProjectMetadata>,
    #[serde(default = "Utc::now")]
    pub last_active_timestamp: DateTime<Utc>,
}

impl UserProject {
    pub fn new(project_address: impl Into<String>, metadata: Option<ProjectMetadata>) -> Self {
        Self {
            project_address: project_address.into(),
            metadata,
            last_active_timestamp: Utc::now(),
        }
    }

    /// Same address and metadata, ignoring the timestamp
    pub fn same_project(&self, other: &UserProject) -> bool {
        self.project_address == other.project_address && self.metadata == other.metadata
    }
}

/// Immutable snapshot of all users' projects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodebaseRegistry {
    projects: HashMap<String, UserProject>,
}

impl CodebaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.projects.contains_key(user_id)
    }

    pub fn projects(&self) -> impl Iterator<Item = (&str, &UserProject)> {
        self.projects.iter().map(|(id, project)| (id.as_str(), project))
    }

    /// Register or refresh a user's project
    pub async fn add_or_refresh<P: ReadinessProbe + ?Sized>(
        &self,
        probe: &P,
        user_id: &str,
        project_address: &str,
        metadata: Option<ProjectMetadata>,
    ) -> Result<Self, CodebaseError> {
        self.add_or_refresh_at(probe, user_id, project_address, metadata, Utc::now())
            .await
    }

    /// [`add_or_refresh`](Self::add_or_refresh) with an explicit "now"
    pub async fn add_or_refresh_at<P: ReadinessProbe + ?Sized>(
        &self,
        probe: &P,
        user_id: &str,
        project_address: &str,
        metadata: Option<ProjectMetadata>,
        now: DateTime<Utc>,
    ) -> Result<Self, CodebaseError> {
        let candidate = UserProject {
            project_address: project_address.to_string(),
            metadata,
            last_active_timestamp: now,
        };

        if let Some(existing) = self.projects.get(user_id) {
            if existing.same_project(&candidate) {
                // Nothing changed: no probe, just mark the user active
                if existing.last_active_timestamp == now {
                    return Ok(self.clone());
                }
                debug!(user_id, "Refreshing project timestamp");
                let mut next = self.clone();
                if let Some(project) = next.projects.get_mut(user_id) {
                    project.last_active_timestamp = now;
                }
                return Ok(next);
            }
        }

        let ready = probe.check(&candidate.project_address).await.map_err(|e| {
            CodebaseError::new(
                CodebaseOperation::AddUserProjectHttpError,
                format!(
                    "HTTP error during health check for project: {}",
                    candidate.project_address
                ),
            )
            .with_user(user_id)
            .with_address(&candidate.project_address)
            .with_details(e)
        })?;

        if !ready {
            return Err(CodebaseError::new(
                CodebaseOperation::AddUserProjectHealthCheckFailed,
                format!("Health check failed for project: {}", candidate.project_address),
            )
            .with_user(user_id)
            .with_address(&candidate.project_address)
            .with_details("Health endpoint did not return 200 OK."));
        }

        info!(user_id, project_address = %candidate.project_address, "Project registered");
        let mut next = self.clone();
        next.projects.insert(user_id.to_string(), candidate);
        Ok(next)
    }

    pub fn get(&self, user_id: &str) -> Result<UserProject, CodebaseError> {
        self.projects.get(user_id).cloned().ok_or_else(|| {
            CodebaseError::new(
                CodebaseOperation::GetUserProjectNotFound,
                format!("User project for user_id '{}' not found.", user_id),
            )
            .with_user(user_id)
        })
    }

    pub fn remove(&self, user_id: &str) -> Result<Self, CodebaseError> {
        if !self.projects.contains_key(user_id) {
            return Err(CodebaseError::new(
                CodebaseOperation::RemoveUserProjectNotFound,
                format!("User project for user_id '{}' not found for removal.", user_id),
            )
            .with_user(user_id));
        }

        let mut next = self.clone();
        next.projects.remove(user_id);
        Ok(next)
    }

    /// Replace a project's metadata, keeping its address and timestamp
    pub fn update_metadata(
        &self,
        user_id: &str,
        metadata: Option<ProjectMetadata>,
    ) -> Result<Self, CodebaseError> {
        let mut next = self.clone();
        match next.projects.get_mut(user_id) {
            Some(project) => {
                project.metadata = metadata;
                Ok(next)
            }
            None => Err(CodebaseError::new(
                CodebaseOperation::UpdateUserProjectMetadataNotFound,
                format!(
                    "User project for user_id '{}' not found for metadata update.",
                    user_id
                ),
            )
            .with_user(user_id)),
        }
    }
}

/// Process-wide codebase sessions: the current snapshot plus the probe used
/// to admit new projects
pub struct CodebaseSessions {
    cell: SnapshotCell<CodebaseRegistry>,
    probe: Arc<dyn ReadinessProbe>,
}

impl CodebaseSessions {
    pub fn new(probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            cell: SnapshotCell::default(),
            probe,
        }
    }

    /// Current snapshot, for read-only iteration
    pub fn snapshot(&self) -> Arc<CodebaseRegistry> {
        self.cell.load()
    }

    pub async fn add_or_refresh(
        &self,
        user_id: &str,
        project_address: &str,
        metadata: Option<ProjectMetadata>,
    ) -> Result<Arc<CodebaseRegistry>, CodebaseError> {
        let checked = self
            .cell
            .load()
            .add_or_refresh(self.probe.as_ref(), user_id, project_address, metadata)
            .await
            .map_err(record)?;
        let project = checked.get(user_id)?;

        // Only this user's entry is written back, so changes published
        // during the readiness check survive
        let next = self.put_project(user_id, project);
        ACTIVE_SESSIONS.with_label_values(&["codebase"]).set(next.len() as i64);
        Ok(next)
    }

    /// Set a user's project on the current snapshot, skipping the swap if equal
    fn put_project(&self, user_id: &str, project: UserProject) -> Arc<CodebaseRegistry> {
        self.cell.modify(|current| {
            if current.projects.get(user_id) == Some(&project) {
                return None;
            }
            let mut next = current.clone();
            next.projects.insert(user_id.to_string(), project.clone());
            Some(next)
        })
    }

    pub fn get(&self, user_id: &str) -> Result<UserProject, CodebaseError> {
        self.cell.load().get(user_id)
    }

    pub fn remove(&self, user_id: &str) -> Result<Arc<CodebaseRegistry>, CodebaseError> {
        let next = self
            .cell
            .try_update(|current| current.remove(user_id))
            .map_err(record)?;
        ACTIVE_SESSIONS.with_label_values(&["codebase"]).set(next.len() as i64);
        Ok(next)
    }

    pub fn update_metadata(
        &self,
        user_id: &str,
        metadata: Option<ProjectMetadata>,
    ) -> Result<Arc<CodebaseRegistry>, CodebaseError> {
        self.cell
            .try_update(|current| current.update_metadata(user_id, metadata.clone()))
            .map_err(record)
    }
}

impl std::fmt::Debug for CodebaseSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodebaseSessions")
            .field("current", &self.cell.load())
            .finish_non_exhaustive()
    }
}

fn record(err: CodebaseError) -> CodebaseError {
    REGISTRY_ERRORS.with_label_values(&[err.operation.as_str()]).inc();
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;

    use crate::session::Fault;

    /// Probe with a fixed answer that counts its calls
    struct StubProbe {
        answer: Result<bool, &'static str>,
        calls: AtomicUsize,
    }

    impl StubProbe {
        fn answering(answer: Result<bool, &'static str>) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReadinessProbe for StubProbe {
        async fn check(&self, _project_address: &str) -> Result<bool, Fault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.map_err(Fault::from)
        }
    }

    fn meta(value: Value) -> Option<ProjectMetadata> {
        value.as_object().cloned()
    }

    #[tokio::test]
    async fn test_add_new_project_after_probe() {
        let probe = StubProbe::answering(Ok(true));
        let reg = CodebaseRegistry::new();

        let next = reg
            .add_or_refresh(&probe, "u1", "http://ok.test", meta(json!({"description": "demo"})))
            .await
            .unwrap();

        assert_eq!(probe.calls(), 1);
        let project = next.get("u1").unwrap();
        assert_eq!(project.project_address, "http://ok.test");
        assert_eq!(project.metadata, meta(json!({"description": "demo"})));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_identical_readd_skips_probe_and_refreshes_timestamp() {
        let probe = StubProbe::answering(Ok(true));
        let t0 = Utc::now() - Duration::minutes(10);
        let reg = CodebaseRegistry::new()
            .add_or_refresh_at(&probe, "u1", "http://ok.test", None, t0)
            .await
            .unwrap();

        let t1 = t0 + Duration::minutes(5);
        let next = reg
            .add_or_refresh_at(&probe, "u1", "http://ok.test", None, t1)
            .await
            .unwrap();

        assert_eq!(probe.calls(), 1);
        assert_eq!(next.get("u1").unwrap().last_active_timestamp, t1);
    }

    #[tokio::test]
    async fn test_identical_readd_same_instant_is_unchanged() {
        let probe = StubProbe::answering(Ok(true));
        let now = Utc::now();
        let once = CodebaseRegistry::new()
            .add_or_refresh_at(&probe, "u1", "http://ok.test", meta(json!({"v": 1})), now)
            .await
            .unwrap();
        let twice = once
            .add_or_refresh_at(&probe, "u1", "http://ok.test", meta(json!({"v": 1})), now)
            .await
            .unwrap();
        assert_eq!(once, twice);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_changed_address_is_probed_again() {
        let probe = StubProbe::answering(Ok(true));
        let reg = CodebaseRegistry::new()
            .add_or_refresh(&probe, "u1", "http://one.test", None)
            .await
            .unwrap();
        let next = reg
            .add_or_refresh(&probe, "u1", "http://two.test", None)
            .await
            .unwrap();
        assert_eq!(probe.calls(), 2);
        assert_eq!(next.get("u1").unwrap().project_address, "http://two.test");
    }

    #[tokio::test]
    async fn test_not_ready_project_is_rejected() {
        let probe = StubProbe::answering(Ok(false));
        let reg = CodebaseRegistry::new();
        let err = reg
            .add_or_refresh(&probe, "u1", "http://bad", None)
            .await
            .unwrap_err();
        assert_eq!(err.operation, CodebaseOperation::AddUserProjectHealthCheckFailed);
        assert_eq!(err.user_id.as_deref(), Some("u1"));
        assert_eq!(err.project_address.as_deref(), Some("http://bad"));
        assert!(!reg.contains("u1"));
    }

    #[tokio::test]
    async fn test_probe_fault_is_http_error() {
        let probe = StubProbe::answering(Err("connection refused"));
        let err = CodebaseRegistry::new()
            .add_or_refresh(&probe, "u1", "http://down.test", None)
            .await
            .unwrap_err();
        assert_eq!(err.operation, CodebaseOperation::AddUserProjectHttpError);
        assert_eq!(err.details.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_failed_change_keeps_old_project() {
        let good = StubProbe::answering(Ok(true));
        let reg = CodebaseRegistry::new()
            .add_or_refresh(&good, "u1", "http://ok.test", None)
            .await
            .unwrap();

        let bad = StubProbe::answering(Ok(false));
        assert!(reg.add_or_refresh(&bad, "u1", "http://bad", None).await.is_err());
        assert_eq!(reg.get("u1").unwrap().project_address, "http://ok.test");
    }

    #[tokio::test]
    async fn test_update_metadata_keeps_address_and_timestamp() {
        let probe = StubProbe::answering(Ok(true));
        let reg = CodebaseRegistry::new()
            .add_or_refresh(&probe, "u1", "http://ok.test", None)
            .await
            .unwrap();
        let before = reg.get("u1").unwrap();

        let next = reg.update_metadata("u1", meta(json!({"branch": "main"}))).unwrap();
        let after = next.get("u1").unwrap();
        assert_eq!(after.metadata, meta(json!({"branch": "main"})));
        assert_eq!(after.project_address, before.project_address);
        assert_eq!(after.last_active_timestamp, before.last_active_timestamp);
    }

    #[test]
    fn test_not_found_kinds_leave_registry_unchanged() {
        let reg = CodebaseRegistry::new();
        assert_eq!(
            reg.get("missing").unwrap_err().operation,
            CodebaseOperation::GetUserProjectNotFound
        );
        assert_eq!(
            reg.remove("missing").unwrap_err().operation,
            CodebaseOperation::RemoveUserProjectNotFound
        );
        assert_eq!(
            reg.update_metadata("missing", None).unwrap_err().operation,
            CodebaseOperation::UpdateUserProjectMetadataNotFound
        );
        assert_eq!(reg, CodebaseRegistry::new());
    }

    #[tokio::test]
    async fn test_sessions_publish_on_success_only() {
        let sessions = CodebaseSessions::new(Arc::new(StubProbe::answering(Ok(true))));
        sessions.add_or_refresh("u1", "http://ok.test", None).await.unwrap();
        let before = sessions.snapshot();

        assert!(sessions.remove("missing").is_err());
        assert!(sessions.update_metadata("missing", None).is_err());
        assert!(Arc::ptr_eq(&before, &sessions.snapshot()));

        sessions.remove("u1").unwrap();
        assert!(sessions.snapshot().is_empty());
        assert!(before.contains("u1"));
    }

    #[tokio::test]
    async fn test_put_equal_project_keeps_published_snapshot() {
        let sessions = CodebaseSessions::new(Arc::new(StubProbe::answering(Ok(true))));
        sessions.add_or_refresh("u1", "http://ok.test", None).await.unwrap();
        let before = sessions.snapshot();

        let same = sessions.put_project("u1", sessions.get("u1").unwrap());
        assert!(Arc::ptr_eq(&before, &same));
        assert!(Arc::ptr_eq(&before, &sessions.snapshot()));
    }

    #[test]
    fn test_user_project_deserializes_without_timestamp() {
        let project: UserProject =
            serde_json::from_value(json!({"project_address": "http://ok.test"})).unwrap();
        assert_eq!(project.project_address, "http://ok.test");
        assert!(project.metadata.is_none());
    }
}
