//! Delta application shared by every store backend
//!
//! A write never removes, reorders or un-completes a checklist item, and never
//! moves the task status backwards. Violations are rejected before anything is
//! changed, so a failed write leaves the stored task untouched.

use super::codec::single_line;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sdk::types::{ChecklistItem, ExecutionLogEntry, ProgressRecord, Task, TaskDelta};
use std::collections::HashSet;

/// Apply `delta` to `task`, returning the updated task and the progress
/// records the store must append.
pub fn apply(
    task: &Task,
    delta: &TaskDelta,
    now: DateTime<Utc>,
) -> Result<(Task, Vec<ProgressRecord>), EngineError> {
    let mut next = task.clone();

    if let Some(replacement) = &delta.checklist {
        check_supersequence(&task.checklist, replacement)?;
        next.checklist = replacement.clone();
    }

    for key in &delta.complete {
        let item = next
            .checklist
            .iter_mut()
            .find(|item| &item.key() == key)
            .ok_or_else(|| EngineError::UnknownChecklistItem(key.clone()))?;
        item.done = true;
    }

    if let Some(status) = delta.status {
        if status.rank() < next.status.rank() {
            return Err(EngineError::NonMonotonicWrite(format!(
                "status cannot move from {} back to {}",
                next.status, status
            )));
        }
        next.status = status;
    }

    let mut seq = next.log.last().map(|entry| entry.seq).unwrap_or(0);
    for append in &delta.log {
        let item = single_line(&append.item);
        if item.is_empty() {
            return Err(EngineError::UnknownChecklistItem(append.item.clone()));
        }
        let command = single_line(&append.command);
        if command.is_empty() {
            return Err(EngineError::Malformed(format!(
                "command log entry for '{}' has no command",
                item
            )));
        }
        seq += 1;
        next.log.push(ExecutionLogEntry {
            seq,
            recorded_at: now,
            item,
            command,
            result: single_line(&append.result),
        });
    }

    let progress = delta
        .progress
        .iter()
        .map(|text| ProgressRecord {
            recorded_at: now,
            text: single_line(text),
        })
        .collect();

    Ok((next, progress))
}

/// The replacement must contain every stored item in the same relative order
/// and keep every done flag.
fn check_supersequence(
    stored: &[ChecklistItem],
    replacement: &[ChecklistItem],
) -> Result<(), EngineError> {
    let mut keys = HashSet::new();
    for item in replacement {
        if !keys.insert(item.key()) {
            return Err(EngineError::NonMonotonicWrite(format!(
                "checklist item '{}' appears twice",
                item.key()
            )));
        }
    }

    let mut cursor = 0;
    for item in stored {
        let offset = replacement[cursor..]
            .iter()
            .position(|candidate| candidate.same_step(item))
            .ok_or_else(|| {
                EngineError::NonMonotonicWrite(format!(
                    "checklist item '{}' would be removed or reordered",
                    item.key()
                ))
            })?;
        let kept = &replacement[cursor + offset];
        if item.done && !kept.done {
            return Err(EngineError::NonMonotonicWrite(format!(
                "checklist item '{}' would be marked not done",
                item.key()
            )));
        }
        cursor += offset + 1;
    }
    Ok(())
}
