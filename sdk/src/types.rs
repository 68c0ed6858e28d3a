//! Task data model
//!
//! The task plan, its checklist, the command execution log and the progress
//! records. These types carry no persistence logic; the memory store in the
//! engine crate owns reading and writing them.

use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a task in the memory bank
///
/// Task ids double as file names, so they are restricted to ASCII
/// alphanumerics, `.`, `_` and `-`, and may not start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Validate and wrap a task id
    pub fn new(id: impl Into<String>) -> Result<Self, EngineError> {
        let id = id.into();
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(EngineError::Malformed(format!("invalid task id '{}'", id)));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Complexity classification recorded by the planning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComplexityLevel {
    Level1,
    Level2,
    Level3,
    Level4,
}

impl ComplexityLevel {
    pub const ALL: [ComplexityLevel; 4] = [
        ComplexityLevel::Level1,
        ComplexityLevel::Level2,
        ComplexityLevel::Level3,
        ComplexityLevel::Level4,
    ];

    pub fn number(&self) -> u8 {
        match self {
            ComplexityLevel::Level1 => 1,
            ComplexityLevel::Level2 => 2,
            ComplexityLevel::Level3 => 3,
            ComplexityLevel::Level4 => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComplexityLevel::Level1 => "quick fix",
            ComplexityLevel::Level2 => "simple enhancement",
            ComplexityLevel::Level3 => "feature",
            ComplexityLevel::Level4 => "system",
        }
    }

    /// Level 3 and Level 4 builds depend on creative-phase decisions
    pub fn requires_creative_records(&self) -> bool {
        matches!(self, ComplexityLevel::Level3 | ComplexityLevel::Level4)
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Level {}", self.number())
    }
}

impl FromStr for ComplexityLevel {
    type Err = EngineError;

    /// Accepts `3`, `Level3`, `Level 3`, `level 3` and `L3`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower
            .strip_prefix("level")
            .or_else(|| lower.strip_prefix('l'))
            .unwrap_or(&lower)
            .trim();

        match digits {
            "1" => Ok(ComplexityLevel::Level1),
            "2" => Ok(ComplexityLevel::Level2),
            "3" => Ok(ComplexityLevel::Level3),
            "4" => Ok(ComplexityLevel::Level4),
            _ => Err(EngineError::UnknownComplexityLevel(s.trim().to_string())),
        }
    }
}

/// Task status as persisted in the task plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    NotStarted,
    PrerequisitesVerified,
    InProgress,
    PhaseComplete,
    Verified,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not-started",
            TaskStatus::PrerequisitesVerified => "prerequisites-verified",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::PhaseComplete => "phase-complete",
            TaskStatus::Verified => "verified",
            TaskStatus::Done => "done",
        }
    }

    /// Ordering used to reject backwards status moves.
    ///
    /// `InProgress` and `PhaseComplete` share a rank so a phased build can
    /// alternate between them.
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::NotStarted => 0,
            TaskStatus::PrerequisitesVerified => 1,
            TaskStatus::InProgress | TaskStatus::PhaseComplete => 2,
            TaskStatus::Verified => 3,
            TaskStatus::Done => 4,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '_'], "-").as_str() {
            "not-started" => Ok(TaskStatus::NotStarted),
            "prerequisites-verified" => Ok(TaskStatus::PrerequisitesVerified),
            "in-progress" => Ok(TaskStatus::InProgress),
            "phase-complete" => Ok(TaskStatus::PhaseComplete),
            "verified" => Ok(TaskStatus::Verified),
            "done" => Ok(TaskStatus::Done),
            other => Err(EngineError::Malformed(format!("unknown status '{}'", other))),
        }
    }
}

/// One step of the build checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub done: bool,
}

impl ChecklistItem {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            phase: None,
            done: false,
        }
    }

    pub fn in_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn completed(mut self) -> Self {
        self.done = true;
        self
    }

    /// Key used by the command log and by deltas to address this item
    pub fn key(&self) -> String {
        match &self.phase {
            Some(phase) => format!("{} / {}", phase, self.description),
            None => self.description.clone(),
        }
    }

    /// Same item, ignoring the done flag
    pub fn same_step(&self, other: &ChecklistItem) -> bool {
        self.description == other.description && self.phase == other.phase
    }
}

/// A command the agent ran, and what it observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    /// Key of the checklist item the command was run for
    pub item: String,
    pub command: String,
    pub result: String,
}

/// A line of the append-only progress document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub recorded_at: DateTime<Utc>,
    pub text: String,
}

/// Design decision document produced by the creative phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativePhaseRecord {
    pub name: String,
    pub title: String,
}

/// The unit of build work, as recorded in its task plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub complexity_level: ComplexityLevel,
    pub status: TaskStatus,
    pub checklist: Vec<ChecklistItem>,
    pub log: Vec<ExecutionLogEntry>,
    /// Free-form lines of the plan that the codec does not interpret
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Task {
    pub fn new(id: TaskId, complexity_level: ComplexityLevel) -> Self {
        Self {
            id,
            complexity_level,
            status: TaskStatus::NotStarted,
            checklist: Vec::new(),
            log: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checklist
            .extend(items.into_iter().map(ChecklistItem::new));
        self
    }

    pub fn item(&self, key: &str) -> Option<&ChecklistItem> {
        self.checklist.iter().find(|item| item.key() == key)
    }

    pub fn is_logged(&self, key: &str) -> bool {
        self.log.iter().any(|entry| entry.item == key)
    }

    /// First item that is not yet done
    pub fn next_pending(&self) -> Option<&ChecklistItem> {
        self.checklist.iter().find(|item| !item.done)
    }

    pub fn done_count(&self) -> usize {
        self.checklist.iter().filter(|item| item.done).count()
    }
}

/// Command log append carried by a delta; the store assigns sequence and time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAppend {
    pub item: String,
    pub command: String,
    pub result: String,
}

/// Structured update applied by `MemoryStore::write`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDelta {
    pub status: Option<TaskStatus>,
    /// Replacement checklist; must keep every stored item, in order
    pub checklist: Option<Vec<ChecklistItem>>,
    /// Item keys to mark done
    pub complete: Vec<String>,
    pub log: Vec<LogAppend>,
    pub progress: Vec<String>,
}

impl TaskDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn checklist(mut self, items: Vec<ChecklistItem>) -> Self {
        self.checklist = Some(items);
        self
    }

    pub fn complete(mut self, key: impl Into<String>) -> Self {
        self.complete.push(key.into());
        self
    }

    pub fn log(
        mut self,
        item: impl Into<String>,
        command: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        self.log.push(LogAppend {
            item: item.into(),
            command: command.into(),
            result: result.into(),
        });
        self
    }

    pub fn progress(mut self, text: impl Into<String>) -> Self {
        self.progress.push(text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.checklist.is_none()
            && self.complete.is_empty()
            && self.log.is_empty()
            && self.progress.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_validation() {
        assert!(TaskId::new("fix-login_redirect.v2").is_ok());
        assert!(TaskId::new("").is_err());
        assert!(TaskId::new("../etc").is_err());
        assert!(TaskId::new(".hidden").is_err());
        assert!(TaskId::new("a/b").is_err());
        assert!(TaskId::new("with space").is_err());
    }

    #[test]
    fn test_complexity_level_parsing() {
        assert_eq!("1".parse::<ComplexityLevel>().unwrap(), ComplexityLevel::Level1);
        assert_eq!("Level2".parse::<ComplexityLevel>().unwrap(), ComplexityLevel::Level2);
        assert_eq!("level 3".parse::<ComplexityLevel>().unwrap(), ComplexityLevel::Level3);
        assert_eq!("L4".parse::<ComplexityLevel>().unwrap(), ComplexityLevel::Level4);

        let err = "Level 5".parse::<ComplexityLevel>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownComplexityLevel(ref raw) if raw == "Level 5"));
        assert!("huge".parse::<ComplexityLevel>().is_err());
    }

    #[test]
    fn test_status_round_trip_and_rank() {
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::PrerequisitesVerified,
            TaskStatus::InProgress,
            TaskStatus::PhaseComplete,
            TaskStatus::Verified,
            TaskStatus::Done,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("In Progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!(TaskStatus::InProgress.rank(), TaskStatus::PhaseComplete.rank());
        assert!(TaskStatus::Verified.rank() > TaskStatus::InProgress.rank());
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_item_keys() {
        let plain = ChecklistItem::new("review");
        assert_eq!(plain.key(), "review");

        let phased = ChecklistItem::new("integration-test").in_phase("Phase 1: Store");
        assert_eq!(phased.key(), "Phase 1: Store / integration-test");
        assert!(!plain.same_step(&phased));
        assert!(phased.same_step(&phased.clone().completed()));
    }

    #[test]
    fn test_task_helpers() {
        let id = TaskId::new("t1").unwrap();
        let mut task = Task::new(id, ComplexityLevel::Level1).with_items(["review", "fix"]);
        assert_eq!(task.next_pending().map(|i| i.key()), Some("review".to_string()));

        task.checklist[0].done = true;
        assert_eq!(task.done_count(), 1);
        assert_eq!(task.next_pending().map(|i| i.key()), Some("fix".to_string()));
        assert!(task.item("fix").is_some());
        assert!(task.item("deploy").is_none());
    }

    #[test]
    fn test_delta_builder() {
        assert!(TaskDelta::new().is_empty());
        let delta = TaskDelta::new()
            .status(TaskStatus::InProgress)
            .complete("review")
            .log("review", "cat tasks.md", "ok")
            .progress("build started");
        assert!(!delta.is_empty());
        assert_eq!(delta.complete, vec!["review"]);
        assert_eq!(delta.log[0].command, "cat tasks.md");
    }
}
