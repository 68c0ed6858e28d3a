//! Membank Engine Library
//!
//! This library provides the build workflow over a memory bank: the document
//! store, the rule catalog, the command execution log and the workflow state
//! machine. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Memory store (task plan, progress and creative-record documents)
pub mod memory;

/// Rule catalog module
pub mod rules;

/// Command execution log
pub mod exec_log;

/// Build workflow state machine
pub mod workflow;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
