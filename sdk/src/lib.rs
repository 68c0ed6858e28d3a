//! Membank SDK
//!
//! Shared error taxonomy and task data model for membank components.
//! This crate is used by the engine library, its binary and anything that
//! wants to read a memory bank without pulling in the workflow engine.

/// Error types and handling
pub mod errors;

/// Task data model
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, MembankErrorExt};
pub use types::{
    ChecklistItem, ComplexityLevel, CreativePhaseRecord, ExecutionLogEntry, LogAppend,
    ProgressRecord, Task, TaskDelta, TaskId, TaskStatus,
};
