//! Memory Store
//!
//! The memory bank is the only durable representation of a task. Every
//! component reads and writes it through the narrow `MemoryStore` contract:
//!
//! - `read` returns the whole task or fails; it never returns a partial parse
//! - `write` applies a structured, monotonic delta and the result is visible
//!   to the very next `read`
//!
//! Backends:
//! - `file`: Markdown documents under a memory-bank directory
//! - `in_memory`: Non-persistent store with the same delta semantics (testing)
//!
//! The store assumes a single writer per task. `FileStore::lock` provides the
//! run lock callers use to serialize runs against the same task.

pub mod codec;
pub mod delta;
mod file;
mod in_memory;

pub use file::{FileStore, RunLock};
pub use in_memory::InMemoryStore;

use sdk::errors::EngineError;
use sdk::types::{CreativePhaseRecord, ProgressRecord, Task, TaskDelta, TaskId};

/// Memory store trait - implemented by all storage backends.
pub trait MemoryStore {
    /// Task named by the active-context document
    fn current_task(&self) -> Result<TaskId, EngineError>;

    /// Raw active-context document, if one exists
    fn active_context(&self) -> Result<Option<String>, EngineError>;

    /// Read the full task plan.
    ///
    /// Fails with `NotFound` when no plan exists and `Malformed` (or
    /// `UnknownComplexityLevel`) when it cannot be fully parsed.
    fn read(&self, id: &TaskId) -> Result<Task, EngineError>;

    /// Apply a delta and return the task as the next `read` will see it.
    fn write(&self, id: &TaskId, delta: &TaskDelta) -> Result<Task, EngineError>;

    /// Creative-decision records for the task, sorted by name
    fn creative_records(&self, id: &TaskId) -> Result<Vec<CreativePhaseRecord>, EngineError>;

    /// Progress records in append order
    fn progress(&self, id: &TaskId) -> Result<Vec<ProgressRecord>, EngineError>;
}
