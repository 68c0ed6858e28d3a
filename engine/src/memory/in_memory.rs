//! In-memory memory store (non-persistent).

use super::{codec, delta, MemoryStore};
use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::{CreativePhaseRecord, ProgressRecord, Task, TaskDelta, TaskId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    current: Option<TaskId>,
    tasks: HashMap<TaskId, Task>,
    creative: HashMap<TaskId, Vec<CreativePhaseRecord>>,
    progress: HashMap<TaskId, Vec<ProgressRecord>>,
    fail_writes: bool,
    writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave a half-applied delta
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_task(&self, task: Task) {
        self.state().tasks.insert(task.id.clone(), task);
    }

    /// Parse a plan document and store the result
    pub fn insert_plan(&self, id: &TaskId, text: &str) -> Result<(), EngineError> {
        let task = codec::parse_task(id, text)?;
        self.insert_task(task);
        Ok(())
    }

    pub fn add_creative_record(&self, id: &TaskId, name: &str, title: &str) {
        let mut state = self.state();
        let records = state.creative.entry(id.clone()).or_default();
        records.push(CreativePhaseRecord {
            name: name.to_string(),
            title: title.to_string(),
        });
        records.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn set_current_task(&self, id: &TaskId) {
        self.state().current = Some(id.clone());
    }

    /// Make every following write fail with `StoreWriteFailed`
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Number of writes that changed the store
    pub fn write_count(&self) -> usize {
        self.state().writes
    }
}

impl MemoryStore for InMemoryStore {
    fn current_task(&self) -> Result<TaskId, EngineError> {
        self.state()
            .current
            .clone()
            .ok_or_else(|| EngineError::NotFound("no current task".to_string()))
    }

    fn active_context(&self) -> Result<Option<String>, EngineError> {
        Ok(self
            .state()
            .current
            .as_ref()
            .map(|id| format!("# Active Context\n\n- Current Task: {}\n", id)))
    }

    fn read(&self, id: &TaskId) -> Result<Task, EngineError> {
        self.state()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("no task plan for '{}'", id)))
    }

    fn write(&self, id: &TaskId, delta: &TaskDelta) -> Result<Task, EngineError> {
        let mut state = self.state();
        let current = state
            .tasks
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("no task plan for '{}'", id)))?;
        if delta.is_empty() {
            return Ok(current.clone());
        }
        if state.fail_writes {
            return Err(EngineError::StoreWriteFailed(format!(
                "writes to '{}' are disabled",
                id
            )));
        }

        let (next, progress) = delta::apply(current, delta, Utc::now())?;
        state.tasks.insert(id.clone(), next.clone());
        state.progress.entry(id.clone()).or_default().extend(progress);
        state.writes += 1;
        Ok(next)
    }

    fn creative_records(&self, id: &TaskId) -> Result<Vec<CreativePhaseRecord>, EngineError> {
        Ok(self.state().creative.get(id).cloned().unwrap_or_default())
    }

    fn progress(&self, id: &TaskId) -> Result<Vec<ProgressRecord>, EngineError> {
        Ok(self.state().progress.get(id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{ComplexityLevel, TaskStatus};

    fn store_with_task() -> (InMemoryStore, TaskId) {
        let store = InMemoryStore::new();
        let id = TaskId::new("t").unwrap();
        store.insert_task(Task::new(id.clone(), ComplexityLevel::Level2).with_items(["a", "b"]));
        (store, id)
    }

    #[test]
    fn test_write_then_read() {
        let (store, id) = store_with_task();
        store
            .write(
                &id,
                &TaskDelta::new()
                    .status(TaskStatus::PrerequisitesVerified)
                    .progress("prerequisites verified"),
            )
            .unwrap();

        assert_eq!(store.read(&id).unwrap().status, TaskStatus::PrerequisitesVerified);
        assert_eq!(store.progress(&id).unwrap().len(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_empty_delta_is_not_counted() {
        let (store, id) = store_with_task();
        store.write(&id, &TaskDelta::new()).unwrap();
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_failing_writes() {
        let (store, id) = store_with_task();
        store.fail_writes(true);
        let err = store.write(&id, &TaskDelta::new().complete("a")).unwrap_err();
        assert!(matches!(err, EngineError::StoreWriteFailed(_)));
        assert!(!store.read(&id).unwrap().checklist[0].done);
    }

    #[test]
    fn test_missing_task() {
        let store = InMemoryStore::new();
        let id = TaskId::new("ghost").unwrap();
        assert!(matches!(store.read(&id), Err(EngineError::NotFound(_))));
        assert!(matches!(store.current_task(), Err(EngineError::NotFound(_))));
        assert!(store.active_context().unwrap().is_none());

        store.set_current_task(&id);
        assert_eq!(store.current_task().unwrap(), id);
    }

    #[test]
    fn test_insert_plan_uses_codec() {
        let store = InMemoryStore::new();
        let id = TaskId::new("t").unwrap();
        let err = store.insert_plan(&id, "").unwrap_err();
        assert!(matches!(err, EngineError::Malformed(_)));

        store
            .insert_plan(&id, "# Task: t\n- Complexity: Level 3\n\n## Checklist\n- [x] a\n")
            .unwrap();
        let task = store.read(&id).unwrap();
        assert_eq!(task.complexity_level, ComplexityLevel::Level3);
        assert!(task.checklist[0].done);
    }
}
