//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - build: Advance the build workflow for a task
//! - log: Append a command execution log entry
//! - status: Show task status and checklist
//! - rules: Show the rule modules to load
//! - progress: Show progress records
//! - config show / validate

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::exec_log::ExecutionLog;
use crate::memory::{FileStore, MemoryStore};
use crate::rules::{RuleCatalog, RuleSet};
use crate::workflow::{RunOutcome, RunReport, WorkflowEngine};
use sdk::errors::{EngineError, MembankErrorExt};
use sdk::types::TaskId;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Process exit code for a build outcome
pub fn exit_code(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Done => 0,
        RunOutcome::Paused(_) => 2,
        RunOutcome::Blocked(_) => 3,
    }
}

/// Task named on the command line, or the current task
fn resolve_task(store: &dyn MemoryStore, task: Option<String>) -> Result<TaskId> {
    match task {
        Some(raw) => Ok(TaskId::new(raw)?),
        None => store
            .current_task()
            .context("No --task given and no current task recorded"),
    }
}

/// Built-in catalog, or the one named by `rules.catalog`
pub async fn load_catalog(config: &Config) -> Result<RuleCatalog> {
    match &config.rules.catalog {
        Some(path) => RuleCatalog::load(path)
            .await
            .with_context(|| format!("Failed to load rule catalog {}", path.display())),
        None => Ok(RuleCatalog::builtin()),
    }
}

fn error_json(err: &EngineError) -> Value {
    json!({
        "kind": err.kind(),
        "message": err.to_string(),
        "hint": err.user_hint(),
        "recoverable": err.is_recoverable(),
    })
}

fn rules_json(rules: &RuleSet, root: &Path, extension: &str, missing: &[String]) -> Value {
    let modules: Vec<Value> = rules
        .resolve(root, extension)
        .into_iter()
        .map(|(id, path)| {
            json!({
                "id": id,
                "path": path,
                "present": !missing.contains(&id),
            })
        })
        .collect();
    json!({
        "mode": rules.mode,
        "level": rules.level.number(),
        "modules": modules,
    })
}

fn print_rules(rules: &RuleSet, root: &Path, extension: &str, missing: &[String]) {
    println!(
        "Rules to load ({} mode, {}):",
        rules.mode, rules.level
    );
    for (id, path) in rules.resolve(root, extension) {
        let marker = if missing.contains(&id) { " (missing)" } else { "" };
        println!("  - {} [{}]{}", id, path.display(), marker);
    }
}

/// Run one build invocation and return the process exit code
pub async fn handle_build(
    task: Option<String>,
    store: &FileStore,
    config: &Config,
    format: OutputFormat,
) -> Result<u8> {
    let id = resolve_task(store, task)?;
    let catalog = load_catalog(config).await?;

    let _lock = if config.build.lock {
        Some(store.lock(&id)?)
    } else {
        None
    };

    let report = WorkflowEngine::new(store, &catalog)
        .with_mode(config.build.mode.clone())
        .run(&id)?;

    let missing = match &report.rules {
        Some(rules) => {
            let missing = rules
                .missing_modules(&config.rules.root, &config.rules.extension)
                .await;
            for id in &missing {
                warn!("Rule module {} not found under {:?}", id, config.rules.root);
            }
            missing
        }
        None => Vec::new(),
    };

    print_report(&report, config, &missing, format)?;
    Ok(exit_code(&report.outcome))
}

fn print_report(
    report: &RunReport,
    config: &Config,
    missing: &[String],
    format: OutputFormat,
) -> Result<()> {
    let trail: Vec<String> = report.trail.iter().map(ToString::to_string).collect();

    match format {
        OutputFormat::Text => {
            println!("Task: {}", report.task_id);
            if let Some(task) = &report.task {
                println!(
                    "Complexity: {} ({})",
                    task.complexity_level,
                    task.complexity_level.label()
                );
                println!("Status: {}", task.status);
                println!(
                    "Checklist: {}/{} done",
                    task.done_count(),
                    task.checklist.len()
                );
            }
            println!("Trail: {}", trail.join(" -> "));
            if let Some(rules) = &report.rules {
                print_rules(rules, &config.rules.root, &config.rules.extension, missing);
            }
            println!("Outcome: {}", report.outcome.label());
            if let Some(err) = report.outcome.error() {
                println!("  {}", err);
                println!("  Hint: {}", err.user_hint());
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "task": report.task_id,
                "state": report.state.to_string(),
                "trail": trail,
                "outcome": report.outcome.label(),
                "error": report.outcome.error().map(error_json),
                "status": report.task.as_ref().map(|task| task.status),
                "checklist": report.task.as_ref().map(|task| json!({
                    "done": task.done_count(),
                    "total": task.checklist.len(),
                })),
                "rules": report.rules.as_ref().map(|rules| {
                    rules_json(rules, &config.rules.root, &config.rules.extension, missing)
                }),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Append a command execution log entry
pub async fn handle_log(
    item: String,
    command: String,
    result: String,
    task: Option<String>,
    store: &FileStore,
    format: OutputFormat,
) -> Result<()> {
    let id = resolve_task(store, task)?;
    let current = store.read(&id)?;
    if current.item(&item).is_none() {
        warn!(
            "'{}' is not in the checklist of {} yet; the next build may add it",
            item, id
        );
    }

    let entry = ExecutionLog::new(store, id.clone())
        .append(&item, &command, &result)
        .context("Failed to append command log entry")?;
    info!("Logged command #{} for {}", entry.seq, id);

    match format {
        OutputFormat::Text => {
            println!("Logged #{} [{}] {} => {}", entry.seq, entry.item, entry.command, entry.result);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "task": id, "entry": entry }))?
            );
        }
    }

    Ok(())
}

/// Show status, complexity and checklist
pub async fn handle_status(
    task: Option<String>,
    store: &FileStore,
    format: OutputFormat,
) -> Result<()> {
    let id = resolve_task(store, task)?;
    let task = store.read(&id)?;
    let creative = store.creative_records(&id)?;
    let next = task.next_pending().map(|item| item.key());

    match format {
        OutputFormat::Text => {
            println!("Task: {}", task.id);
            println!(
                "Complexity: {} ({})",
                task.complexity_level,
                task.complexity_level.label()
            );
            println!("Status: {}", task.status);
            if task.complexity_level.requires_creative_records() {
                println!("Creative records: {}", creative.len());
            }
            println!();
            println!(
                "Checklist ({}/{} done):",
                task.done_count(),
                task.checklist.len()
            );
            for item in &task.checklist {
                let key = item.key();
                let mark = if item.done { "x" } else { " " };
                let logged = task.log.iter().filter(|entry| entry.item == key).count();
                println!("  [{}] {} ({} logged)", mark, key, logged);
            }
            if let Some(next) = &next {
                println!();
                println!("Next: {}", next);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "task": task,
                "creative_records": creative,
                "next": next,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the rule set for a level, or for the task's recorded level
pub async fn handle_rules(
    level: Option<String>,
    mode: Option<String>,
    task: Option<String>,
    store: &FileStore,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let catalog = load_catalog(config).await?;
    let mode = mode.unwrap_or_else(|| config.build.mode.clone());

    let rules = match level {
        Some(level) => catalog.lookup(&mode, &level)?,
        None => {
            let id = resolve_task(store, task)?;
            let task = store.read(&id)?;
            catalog.lookup_level(&mode, task.complexity_level)?
        }
    };

    let missing = rules
        .missing_modules(&config.rules.root, &config.rules.extension)
        .await;
    for id in &missing {
        warn!("Rule module {} not found under {:?}", id, config.rules.root);
    }

    match format {
        OutputFormat::Text => {
            print_rules(&rules, &config.rules.root, &config.rules.extension, &missing);
        }
        OutputFormat::Json => {
            let output = rules_json(&rules, &config.rules.root, &config.rules.extension, &missing);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show progress records in append order
pub async fn handle_progress(
    task: Option<String>,
    store: &FileStore,
    format: OutputFormat,
) -> Result<()> {
    let id = resolve_task(store, task)?;
    let records = store.progress(&id)?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No progress recorded for {}", id);
                return Ok(());
            }
            println!("Progress for {}:", id);
            for record in &records {
                println!(
                    "  {} {}",
                    record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    record.text
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "task": id,
                "records": records,
                "count": records.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print the effective configuration
pub async fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let toml_string =
                toml::to_string_pretty(config).context("Failed to serialize configuration")?;
            println!("{}", toml_string);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

/// Report that the configuration loaded and validated
pub async fn handle_config_validate(
    config: &Config,
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let catalog = load_catalog(config).await?;
    let modes: Vec<&str> = catalog.modes().collect();
    if !modes.contains(&config.build.mode.as_str()) {
        return Err(EngineError::UnknownMode(config.build.mode.clone()).into());
    }

    let source = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.membank/config.toml".to_string());
    match format {
        OutputFormat::Text => {
            println!("Configuration is valid: {}", source);
            println!("  Catalog modes: {}", modes.join(", "));
        }
        OutputFormat::Json => {
            let output = json!({ "valid": true, "path": source, "modes": modes });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
