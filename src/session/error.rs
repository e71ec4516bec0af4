//! Error taxonomy for session registry transitions
//!
//! Every registry operation returns one of these instead of panicking. Each
//! error names the operation outcome that produced it, so callers (the HTTP
//! layer, the reaper) can render or log it without string matching.

use serde::Serialize;

/// Failure reported by an external collaborator (browser, devbox, agent)
pub type Fault = Box<dyn std::error::Error + Send + Sync>;

/// Outcome kinds for browser registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserOperation {
    AddUserContextExists,
    GetUserContextNotFound,
    GetUserMetadataNotFound,
    RemoveUserContextNotFound,
    UpdateUserMetadataNotFound,
    AddUserContextFailed,
    RemoveUserContextFailed,
    ShutdownBrowser,
    CloseMainBrowser,
}

impl BrowserOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserOperation::AddUserContextExists => "add_user_context_exists",
            BrowserOperation::GetUserContextNotFound => "get_user_context_not_found",
            BrowserOperation::GetUserMetadataNotFound => "get_user_metadata_not_found",
            BrowserOperation::RemoveUserContextNotFound => "remove_user_context_not_found",
            BrowserOperation::UpdateUserMetadataNotFound => "update_user_metadata_not_found",
            BrowserOperation::AddUserContextFailed => "add_user_context_failed",
            BrowserOperation::RemoveUserContextFailed => "remove_user_context_failed",
            BrowserOperation::ShutdownBrowser => "shutdown_browser",
            BrowserOperation::CloseMainBrowser => "close_main_browser",
        }
    }

    /// Whether this outcome means "no such user" rather than a real failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BrowserOperation::GetUserContextNotFound
                | BrowserOperation::GetUserMetadataNotFound
                | BrowserOperation::RemoveUserContextNotFound
                | BrowserOperation::UpdateUserMetadataNotFound
        )
    }
}

impl std::fmt::Display for BrowserOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by browser registry operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowserError {
    pub operation: BrowserOperation,
    pub message: String,
    pub user_id: Option<String>,
    pub details: Option<String>,
}

impl BrowserError {
    pub fn new(operation: BrowserOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            user_id: None,
            details: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_details(mut self, details: impl ToString) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

impl std::fmt::Display for BrowserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.operation, self.message)?;
        if let Some(details) = &self.details {
            write!(f, ": {}", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for BrowserError {}

/// Outcome kinds for codebase registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodebaseOperation {
    AddUserProjectHealthCheckFailed,
    AddUserProjectHttpError,
    RemoveUserProjectNotFound,
    GetUserProjectNotFound,
    UpdateUserProjectMetadataNotFound,
}

impl CodebaseOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodebaseOperation::AddUserProjectHealthCheckFailed => {
                "add_user_project_health_check_failed"
            }
            CodebaseOperation::AddUserProjectHttpError => "add_user_project_http_error",
            CodebaseOperation::RemoveUserProjectNotFound => "remove_user_project_not_found",
            CodebaseOperation::GetUserProjectNotFound => "get_user_project_not_found",
            CodebaseOperation::UpdateUserProjectMetadataNotFound => {
                "update_user_project_metadata_not_found"
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CodebaseOperation::RemoveUserProjectNotFound
                | CodebaseOperation::GetUserProjectNotFound
                | CodebaseOperation::UpdateUserProjectMetadataNotFound
        )
    }
}

impl std::fmt::Display for CodebaseOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by codebase registry operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodebaseError {
    pub operation: CodebaseOperation,
    pub message: String,
    pub user_id: Option<String>,
    pub project_address: Option<String>,
    pub details: Option<String>,
}

impl CodebaseError {
    pub fn new(operation: CodebaseOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            user_id: None,
            project_address: None,
            details: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_address(mut self, project_address: impl Into<String>) -> Self {
        self.project_address = Some(project_address.into());
        self
    }

    pub fn with_details(mut self, details: impl ToString) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

impl std::fmt::Display for CodebaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.operation, self.message)?;
        if let Some(details) = &self.details {
            write!(f, ": {}", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for CodebaseError {}
