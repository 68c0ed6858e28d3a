//! Configuration management
//!
//! This module handles loading, validation, and management of the membank
//! configuration. Configuration is stored in TOML format at
//! ~/.membank/config.toml and created with defaults on first use.
//!
//! # Configuration Sections
//!
//! - **core**: Memory-bank directory and log level
//! - **rules**: Where rule-module files live, and an optional catalog override
//! - **build**: Workflow mode and run locking
//!
//! # Path Expansion
//!
//! `~` is expanded to the user's home directory. Relative paths are kept
//! relative and resolve against the directory `membank` is run from, so one
//! config works for every project that keeps its memory bank in the same
//! place.
//!
//! # Examples
//!
//! ```no_run
//! use membank_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Memory bank: {:?}", config.core.memory_bank);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Rule module resolution
    #[serde(default)]
    pub rules: RulesConfig,

    /// Build workflow settings
    #[serde(default)]
    pub build: BuildConfig,
}

/// Core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Directory holding the memory-bank documents
    #[serde(default = "default_memory_bank")]
    pub memory_bank: PathBuf,

    /// Logging level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Rule module resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Directory rule-module ids are resolved against
    #[serde(default = "default_rules_root")]
    pub root: PathBuf,

    /// File extension of rule-module files
    #[serde(default = "default_rules_extension")]
    pub extension: String,

    /// TOML rule catalog replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
}

/// Build workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Rule catalog mode the build looks up
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Take the per-task run lock during `membank build`
    #[serde(default = "default_lock")]
    pub lock: bool,
}

fn default_memory_bank() -> PathBuf {
    PathBuf::from("memory-bank")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rules_root() -> PathBuf {
    PathBuf::from(".cursor/rules/isolation_rules")
}

fn default_rules_extension() -> String {
    "mdc".to_string()
}

fn default_mode() -> String {
    crate::rules::BUILD_MODE.to_string()
}

fn default_lock() -> bool {
    true
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            memory_bank: default_memory_bank(),
            log_level: default_log_level(),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            root: default_rules_root(),
            extension: default_rules_extension(),
            catalog: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            lock: default_lock(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.membank/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Write the default configuration to `path` and return it
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();

        // Serialize before processing so the file keeps portable paths
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.membank/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".membank").join("config.toml"))
    }

    /// Validate values and expand `~` in paths
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        validate_log_level(&self.core.log_level)?;

        if self.build.mode.trim().is_empty() {
            return Err(EngineError::Config("build.mode must not be empty".to_string()));
        }

        let extension = self.rules.extension.trim().trim_start_matches('.');
        if extension.is_empty() {
            return Err(EngineError::Config(format!(
                "Invalid rules.extension '{}'",
                self.rules.extension
            )));
        }
        self.rules.extension = extension.to_string();

        self.core.memory_bank = expand_path(&self.core.memory_bank)?;
        self.rules.root = expand_path(&self.rules.root)?;
        if let Some(catalog) = &self.rules.catalog {
            self.rules.catalog = Some(expand_path(catalog)?);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            rules: RulesConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Check a log level from the config file or the `--log` flag
pub fn validate_log_level(level: &str) -> Result<(), EngineError> {
    if VALID_LOG_LEVELS.contains(&level) {
        return Ok(());
    }
    Err(EngineError::Config(format!(
        "Invalid log level '{}'. Must be one of: {}",
        level,
        VALID_LOG_LEVELS.join(", ")
    )))
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
