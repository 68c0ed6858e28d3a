// Membank build workflow
// Main entry point for the membank binary

use std::process::ExitCode;

use clap::Parser;
use membank_engine::cli::{Cli, Command, ConfigAction};
use membank_engine::config::{validate_log_level, Config};
use membank_engine::handlers::{
    handle_build, handle_config_show, handle_config_validate, handle_log, handle_progress,
    handle_rules, handle_status, OutputFormat,
};
use membank_engine::memory::FileStore;
use membank_engine::telemetry::init_telemetry_with_level;
use sdk::errors::{EngineError, MembankErrorExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            if let Some(engine_err) = err.downcast_ref::<EngineError>() {
                eprintln!("Hint: {}", engine_err.user_hint());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config; RUST_LOG wins over both
    let log_level = match cli.log.as_deref() {
        Some(level) => {
            validate_log_level(level)?;
            level
        }
        None => config.core.log_level.as_str(),
    };
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::debug!("membank v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let memory_bank = cli
        .memory_bank
        .clone()
        .unwrap_or_else(|| config.core.memory_bank.clone());
    tracing::debug!("Using memory bank {:?}", memory_bank);
    let store = FileStore::new(memory_bank);

    match cli.command {
        Command::Build { task } => handle_build(task, &store, &config, format).await,

        Command::Log {
            item,
            command,
            result,
            task,
        } => {
            handle_log(item, command, result, task, &store, format).await?;
            Ok(0)
        }

        Command::Status { task } => {
            handle_status(task, &store, format).await?;
            Ok(0)
        }

        Command::Rules { level, mode, task } => {
            handle_rules(level, mode, task, &store, &config, format).await?;
            Ok(0)
        }

        Command::Progress { task } => {
            handle_progress(task, &store, format).await?;
            Ok(0)
        }

        Command::Config { action } => {
            match action {
                ConfigAction::Show => handle_config_show(&config, format).await?,
                ConfigAction::Validate => {
                    handle_config_validate(&config, cli.config.as_deref(), format).await?
                }
            }
            Ok(0)
        }
    }
}
