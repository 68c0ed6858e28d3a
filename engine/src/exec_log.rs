//! Command Execution Log
//!
//! Append-only record of the commands the agent ran for each checklist item
//! and what it observed. Entries live in the task plan's command log section
//! and are totally ordered by their sequence number.

use crate::memory::MemoryStore;
use sdk::errors::EngineError;
use sdk::types::{ExecutionLogEntry, Task, TaskDelta, TaskId};
use tracing::debug;

pub struct ExecutionLog<'a> {
    store: &'a dyn MemoryStore,
    task: TaskId,
}

impl<'a> ExecutionLog<'a> {
    pub fn new(store: &'a dyn MemoryStore, task: TaskId) -> Self {
        Self { store, task }
    }

    pub fn task(&self) -> &TaskId {
        &self.task
    }

    /// Record a command run for `item`. The only mutator.
    ///
    /// The item key is not checked against the checklist: the agent may log
    /// work for a workflow step before the first build has added it to the
    /// plan.
    pub fn append(
        &self,
        item: &str,
        command: &str,
        result: &str,
    ) -> Result<ExecutionLogEntry, EngineError> {
        let delta = TaskDelta::new().log(item, command, result);
        let task = self.store.write(&self.task, &delta)?;
        let entry = task.log.last().cloned().ok_or_else(|| {
            EngineError::StoreWriteFailed(format!(
                "log entry for '{}' missing after write",
                item
            ))
        })?;
        debug!("Logged #{} for {}: {}", entry.seq, item, entry.command);
        Ok(entry)
    }

    pub fn entries(&self) -> Result<Vec<ExecutionLogEntry>, EngineError> {
        Ok(self.store.read(&self.task)?.log)
    }

    pub fn entries_for(&self, item: &str) -> Result<Vec<ExecutionLogEntry>, EngineError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|entry| entry.item == item)
            .collect())
    }

    pub fn is_logged(&self, item: &str) -> Result<bool, EngineError> {
        Ok(self.store.read(&self.task)?.is_logged(item))
    }

    /// First completed checklist item of `task` with no log entry
    pub fn first_gap(task: &Task) -> Option<String> {
        task.checklist
            .iter()
            .filter(|item| item.done)
            .map(|item| item.key())
            .find(|key| !task.is_logged(key))
    }
}
