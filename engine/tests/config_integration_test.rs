//! Integration tests for configuration management
//!
//! These tests load real TOML files through the public API and check that
//! defaults apply, values are normalised and invalid files are rejected.

use membank_engine::config::Config;
use membank_engine::rules::BUILD_MODE;
use sdk::errors::EngineError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_config_toml_parsing() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
[core]
memory_bank = "docs/memory-bank"
log_level = "debug"

[rules]
root = "rules"
extension = ".md"
catalog = "rules/catalog.toml"

[build]
mode = "implement"
lock = false
"#,
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.memory_bank, Path::new("docs/memory-bank"));
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.rules.root, Path::new("rules"));
    assert_eq!(config.rules.extension, "md");
    assert_eq!(config.rules.catalog.as_deref(), Some(Path::new("rules/catalog.toml")));
    assert_eq!(config.build.mode, "implement");
    assert!(!config.build.lock);
}

#[test]
fn test_defaults_fill_missing_sections() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[core]\n");

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.memory_bank, Path::new("memory-bank"));
    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.rules.root, Path::new(".cursor/rules/isolation_rules"));
    assert_eq!(config.rules.extension, "mdc");
    assert!(config.rules.catalog.is_none());
    assert_eq!(config.build.mode, BUILD_MODE);
    assert!(config.build.lock);
}

#[test]
fn test_tilde_is_expanded() {
    let Some(home) = dirs::home_dir() else {
        return;
    };
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[core]\nmemory_bank = \"~/notes/memory-bank\"\n");

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.memory_bank, home.join("notes/memory-bank"));
}

#[test]
fn test_invalid_log_level_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[core]\nlog_level = \"verbose\"\n");

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, EngineError::Config(ref msg) if msg.contains("verbose")));
}

#[test]
fn test_empty_mode_and_extension_are_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let path = write_config(&temp_dir, "[core]\n\n[build]\nmode = \"  \"\n");
    assert!(matches!(
        Config::load_from_path(&path),
        Err(EngineError::Config(_))
    ));

    let path = write_config(&temp_dir, "[core]\n\n[rules]\nextension = \".\"\n");
    assert!(matches!(
        Config::load_from_path(&path),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn test_unparsable_and_missing_files() {
    let temp_dir = TempDir::new().unwrap();

    let path = write_config(&temp_dir, "[core\nlog_level = ");
    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, EngineError::Config(ref msg) if msg.contains("parse")));

    let err = Config::load_from_path(&temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(ref msg) if msg.contains("read")));
}

#[test]
fn test_default_config_serializes_and_reloads() {
    let temp_dir = TempDir::new().unwrap();
    let toml_string = toml::to_string_pretty(&Config::default()).unwrap();
    let path = write_config(&temp_dir, &toml_string);

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.build.mode, BUILD_MODE);
    assert_eq!(config.rules.extension, "mdc");
}
