//! CLI interface for membank
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the build workflow.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Memory-bank build workflow
///
/// Walks the current task through its level-appropriate build checklist and
/// records progress in the memory bank.
#[derive(Parser, Debug)]
#[command(name = "membank")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Memory-bank directory (overrides core.memory_bank)
    #[arg(long, global = true, value_name = "DIR")]
    pub memory_bank: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Advance the build workflow as far as the memory bank allows
    Build {
        /// Task to build (default: the current task)
        #[arg(long)]
        task: Option<String>,
    },

    /// Record a command run for a checklist item
    Log {
        /// Checklist item key, e.g. "fix" or "Phase 1 / integration-test"
        item: String,
        /// Command that was run
        command: String,
        /// Observed result
        result: String,
        /// Task to log against (default: the current task)
        #[arg(long)]
        task: Option<String>,
    },

    /// Show task status and checklist
    Status {
        #[arg(long)]
        task: Option<String>,
    },

    /// Show the rule modules for a complexity level
    Rules {
        /// Complexity level (default: the task's recorded level)
        #[arg(long)]
        level: Option<String>,
        /// Catalog mode (default: build.mode)
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        task: Option<String>,
    },

    /// Show the task's progress records
    Progress {
        #[arg(long)]
        task: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["membank", "build"]);
        assert!(matches!(cli.command, Command::Build { task: None }));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
        assert!(cli.memory_bank.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "membank",
            "status",
            "--json",
            "--log",
            "debug",
            "--memory-bank",
            "/tmp/mb",
        ]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert_eq!(cli.memory_bank, Some(PathBuf::from("/tmp/mb")));
    }

    #[test]
    fn test_log_command() {
        let cli = Cli::parse_from([
            "membank",
            "log",
            "fix",
            "cargo test",
            "12 passed",
            "--task",
            "fix-login",
        ]);
        if let Command::Log {
            item,
            command,
            result,
            task,
        } = cli.command
        {
            assert_eq!(item, "fix");
            assert_eq!(command, "cargo test");
            assert_eq!(result, "12 passed");
            assert_eq!(task, Some("fix-login".to_string()));
        } else {
            panic!("Expected Log command");
        }
    }

    #[test]
    fn test_rules_command() {
        let cli = Cli::parse_from(["membank", "rules", "--level", "3"]);
        if let Command::Rules { level, mode, task } = cli.command {
            assert_eq!(level, Some("3".to_string()));
            assert!(mode.is_none());
            assert!(task.is_none());
        } else {
            panic!("Expected Rules command");
        }
    }

    #[test]
    fn test_config_show() {
        let cli = Cli::parse_from(["membank", "config", "show"]);
        if let Command::Config { action } = cli.command {
            assert!(matches!(action, ConfigAction::Show));
        } else {
            panic!("Expected Config command");
        }
    }
}
