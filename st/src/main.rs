//! SmartTrack - fitness tracker core
//!
//! CLI entry point for booting the application and managing its data.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use kvstore::{FileBackend, KvBackend, MemoryBackend};
use smarttrack::app::App;
use smarttrack::cli::{Cli, Command};
use smarttrack::config::Config;
use smarttrack::notify::{ConsoleNotifier, Notifier};
use smarttrack::router::{HeadlessViewport, describe};
use smarttrack::storage::{Storage, StorageKey};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smarttrack")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("smarttrack.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn open_backend(config: &Config, memory: bool) -> Result<Arc<dyn KvBackend>> {
    if memory || config.storage.memory_only {
        debug!("open_backend: memory");
        return Ok(Arc::new(MemoryBackend::new()));
    }
    let path = &config.storage.path;
    let backend = FileBackend::open(path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?
        .with_quota(config.storage.quota_bytes);
    Ok(Arc::new(backend))
}

async fn open_storage(config: &Config) -> Result<Storage> {
    let backend = open_backend(config, false)?;
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let storage =
        Storage::new(backend, config.event_bus(), config.storage_options()).with_notifier(notifier);
    storage.init().await;
    Ok(storage)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(store) = cli.store {
        config.storage.path = store;
    }
    info!("SmartTrack loaded config: store={}", config.storage.path.display());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Start { route, memory } => cmd_start(config, route.as_deref(), memory).await,
        Command::Export { output } => cmd_export(&config, output).await,
        Command::Import { file } => cmd_import(&config, &file).await,
        Command::Get { key } => cmd_get(&config, &key).await,
        Command::Size => cmd_size(&config).await,
        Command::Cleanup => cmd_cleanup(&config).await,
        Command::Clear { yes } => cmd_clear(&config, yes).await,
        Command::Keys => cmd_keys(&config).await,
    }
}

async fn cmd_start(config: Config, route: Option<&str>, memory: bool) -> Result<()> {
    let backend = open_backend(&config, memory)?;
    let viewport = Arc::new(HeadlessViewport::new());
    let app = App::standard(config, backend, Arc::new(ConsoleNotifier), viewport.clone());

    let report = app.start(route).await?;

    println!("{} SmartTrack started", "✓".green());
    if let Some(mode) = report.storage_mode {
        println!("  storage:  {:?}", mode);
    }
    if !report.seeded.is_empty() {
        println!("  seeded:   {}", report.seeded.join(", "));
    }
    println!("  modules:  {}", report.initialized.join(", "));
    for skipped in &report.skipped {
        println!("  {} skipped {}", "!".yellow(), skipped);
    }
    for failure in &report.failed {
        println!("  {} {}: {}", "✗".red(), failure.module, failure.error);
    }
    let state = viewport.snapshot();
    println!("  screen:   {}", state.title.cyan());
    if let Some(router) = app.router() {
        debug!(router = %describe(&router), "cmd_start: final router state");
    }

    app.shutdown().await;
    Ok(())
}

async fn cmd_export(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let storage = open_storage(config).await?;
    let document = storage.export_data().await;
    let json = serde_json::to_string_pretty(&document)?;

    match output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Exported to {}", "✓".green(), path.display().to_string().cyan());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn cmd_import(config: &Config, file: &PathBuf) -> Result<()> {
    let content = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let data: serde_json::Value = serde_json::from_str(&content).context("Import file is not valid JSON")?;

    let storage = open_storage(config).await?;
    if storage.import_data(&data).await {
        println!("{} Imported {}", "✓".green(), file.display().to_string().cyan());
        Ok(())
    } else {
        Err(eyre::eyre!("Import of {} was incomplete", file.display()))
    }
}

async fn cmd_get(config: &Config, key: &str) -> Result<()> {
    let key: StorageKey = key.parse()?;
    let storage = open_storage(config).await?;
    match storage.get(key).await {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => {
            eprintln!("{} No data for {}", "✗".red(), key.to_string().yellow());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn cmd_size(config: &Config) -> Result<()> {
    let storage = open_storage(config).await?;
    let size = storage.get_storage_size().await;
    println!("{} bytes ({} KB, {} MB)", size.bytes.to_string().bold(), size.kb, size.mb);
    Ok(())
}

async fn cmd_cleanup(config: &Config) -> Result<()> {
    let storage = open_storage(config).await?;
    let report = storage.cleanup().await;
    println!(
        "{} Removed {} legacy keys, pruned {} sessions",
        "✓".green(),
        report.legacy_keys_removed,
        report.sessions_pruned
    );
    Ok(())
}

async fn cmd_clear(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        eprintln!("{} Refusing to delete all data without --yes", "!".yellow());
        std::process::exit(2);
    }
    let storage = open_storage(config).await?;
    if storage.clear().await {
        println!("{} All data cleared", "✓".green());
        Ok(())
    } else {
        Err(eyre::eyre!("Some documents could not be removed"))
    }
}

async fn cmd_keys(config: &Config) -> Result<()> {
    let storage = open_storage(config).await?;
    for key in StorageKey::ALL {
        let marker = if storage.get(key).await.is_some() {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("{} {}", marker, key);
    }
    Ok(())
}
