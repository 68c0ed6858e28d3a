//! Error types and handling
//!
//! This module provides the error taxonomy shared by every membank component.
//! All errors implement the `MembankErrorExt` trait which provides a
//! user-facing hint and tells the caller whether the condition clears on its
//! own once the agent performs the missing action.
//!
//! # Blocking conditions
//!
//! Every variant that stops the build workflow names the exact thing that is
//! missing: the checklist entry, the prerequisite document, or the log gap.
//! A `Display` string without that name is a bug.

use thiserror::Error;

/// Trait for membank error extensions
pub trait MembankErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors pause the workflow: the engine holds its state and
    /// the same transition is retried on the next invocation. Non-recoverable
    /// errors end the run and need external remediation.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, MembankErrorExt};
///
/// let paused = EngineError::IncompleteChecklist { item: "test".to_string() };
/// assert!(paused.is_recoverable());
/// assert!(paused.to_string().contains("test"));
///
/// let fatal = EngineError::NotFound("tasks/fix-login.md".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Memory store read errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    // Workflow gates
    #[error("Prerequisites missing for task {task}: {missing}")]
    PrerequisitesMissing { task: String, missing: String },

    #[error("Unknown complexity level: {0}")]
    UnknownComplexityLevel(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Unlogged action: checklist item '{item}' is done but has no command log entry")]
    UnloggedAction { item: String },

    #[error("Incomplete checklist: item '{item}' is not done")]
    IncompleteChecklist { item: String },

    // Memory store write errors
    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Unknown checklist item: {0}")]
    UnknownChecklistItem(String),

    #[error("Non-monotonic write rejected: {0}")]
    NonMonotonicWrite(String),

    #[error("Task {0} is locked by another run")]
    TaskLocked(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MembankErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::NotFound(_) => "Run the planning step first so the task plan exists",
            Self::Malformed(_) => "Fix the task plan document and run the build again",
            Self::PrerequisitesMissing { .. } => {
                "Complete the planning or creative phase, then run the build again"
            }
            Self::UnknownComplexityLevel(_) => "Complexity must be one of Level 1 to Level 4",
            Self::UnknownMode(_) => "Check the mode name against the rule catalog",
            Self::UnloggedAction { .. } => {
                "Record the command you ran for this item with 'membank log'"
            }
            Self::IncompleteChecklist { .. } => {
                "Perform the pending item, log it with 'membank log', then run the build again"
            }
            Self::StoreWriteFailed(_) => "Check that the memory bank directory is writable",
            Self::UnknownChecklistItem(_) => "Use the item text exactly as it appears in the plan",
            Self::NonMonotonicWrite(_) => "Completed checklist items cannot be undone or reordered",
            Self::TaskLocked(_) => "Wait for the other run to finish or remove the stale lock file",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnloggedAction { .. } | Self::IncompleteChecklist { .. } | Self::TaskLocked(_)
        )
    }
}

impl EngineError {
    /// Short stable identifier used in JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Malformed(_) => "malformed",
            Self::PrerequisitesMissing { .. } => "prerequisites_missing",
            Self::UnknownComplexityLevel(_) => "unknown_complexity_level",
            Self::UnknownMode(_) => "unknown_mode",
            Self::UnloggedAction { .. } => "unlogged_action",
            Self::IncompleteChecklist { .. } => "incomplete_checklist",
            Self::StoreWriteFailed(_) => "store_write_failed",
            Self::UnknownChecklistItem(_) => "unknown_checklist_item",
            Self::NonMonotonicWrite(_) => "non_monotonic_write",
            Self::TaskLocked(_) => "task_locked",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}
