//! Workflow Engine
//!
//! The state machine behind `membank build`:
//!
//! ```text
//! Init -> PrerequisitesChecked -> ComplexityResolved -> RulesLoaded
//!      -> LevelNFlow -> LogReviewed -> Verified -> Done
//! ```
//!
//! One invocation walks as far as the memory bank allows and reports where
//! it stopped. Nothing is retried here; the agent performs the missing action
//! and invokes the build again, which resumes from the persisted state.

mod engine;
pub mod flows;

pub use engine::WorkflowEngine;
pub use flows::Flow;

use crate::rules::RuleSet;
use sdk::errors::EngineError;
use sdk::types::{ComplexityLevel, Task, TaskId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Init,
    PrerequisitesChecked,
    ComplexityResolved,
    RulesLoaded,
    Flow(ComplexityLevel),
    LogReviewed,
    Verified,
    Done,
    Blocked,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Init => f.write_str("init"),
            WorkflowState::PrerequisitesChecked => f.write_str("prerequisites-checked"),
            WorkflowState::ComplexityResolved => f.write_str("complexity-resolved"),
            WorkflowState::RulesLoaded => f.write_str("rules-loaded"),
            WorkflowState::Flow(level) => write!(f, "level{}-flow", level.number()),
            WorkflowState::LogReviewed => f.write_str("log-reviewed"),
            WorkflowState::Verified => f.write_str("verified"),
            WorkflowState::Done => f.write_str("done"),
            WorkflowState::Blocked => f.write_str("blocked"),
        }
    }
}

/// How an invocation ended
#[derive(Debug)]
pub enum RunOutcome {
    Done,
    /// Recoverable; the engine rests in the flow state until the condition clears
    Paused(EngineError),
    /// Fatal for this run; needs remediation outside the build
    Blocked(EngineError),
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done)
    }

    pub fn error(&self) -> Option<&EngineError> {
        match self {
            RunOutcome::Done => None,
            RunOutcome::Paused(err) | RunOutcome::Blocked(err) => Some(err),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Done => "done",
            RunOutcome::Paused(_) => "paused",
            RunOutcome::Blocked(_) => "blocked",
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub task_id: TaskId,
    /// State the engine rests in
    pub state: WorkflowState,
    /// Every state entered during the run, in order
    pub trail: Vec<WorkflowState>,
    /// Rule modules the agent should load, once resolved
    pub rules: Option<RuleSet>,
    pub outcome: RunOutcome,
    /// Task as persisted when the run ended, if it could be read
    pub task: Option<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(WorkflowState::Flow(ComplexityLevel::Level4).to_string(), "level4-flow");
        assert_eq!(WorkflowState::PrerequisitesChecked.to_string(), "prerequisites-checked");
    }

    #[test]
    fn test_outcome_error() {
        assert!(RunOutcome::Done.error().is_none());
        let paused = RunOutcome::Paused(EngineError::IncompleteChecklist {
            item: "test".to_string(),
        });
        assert_eq!(paused.label(), "paused");
        assert!(paused.error().is_some());
    }
}
