// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ablage: local AI-assisted inbox sorter
//!
//! Watches the inbox, asks a local model for three destination folders per
//! document and serves the pending decisions over a small JSON API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use ablage::audit::AuditLog;
use ablage::config::AppConfig;
use ablage::db::DecisionLog;
use ablage::ollama::OllamaClient;
use ablage::pipeline::{self, Pipeline};
use ablage::watcher::Dispatcher;
use ablage::web;

/// Ablage CLI - AI-assisted inbox sorting with a human in the loop
#[derive(Parser, Debug)]
#[command(name = "ablage")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Suggests destination folders for inbox documents; you decide", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the inbox, classify new files and serve the decision API
    Run {
        /// Skip the inference backend check on startup
        #[arg(long)]
        skip_health_check: bool,

        /// Do not start the decision API
        #[arg(long)]
        no_web: bool,
    },

    /// Suggest folders for a single file and print them as JSON
    Classify {
        /// File to classify
        path: PathBuf,
    },

    /// Placement audit log
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Decision log
    Decisions {
        #[command(subcommand)]
        action: DecisionCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show inference backend and log status
    Status,
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent placements
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
}

#[derive(Subcommand, Debug)]
enum DecisionCommands {
    /// Acceptance rate and folder counts
    Stats,

    /// Most recent decisions
    Recent {
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;

    match cli.command {
        Some(Commands::Run { skip_health_check, no_web }) => run(config, skip_health_check, no_web).await,
        Some(Commands::Classify { path }) => run_classify(config, path).await,
        Some(Commands::History { action }) => run_history_command(config, action),
        Some(Commands::Decisions { action }) => run_decisions_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        None => run(config, false, false).await,
    }
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<Arc<Pipeline>> {
    let client = OllamaClient::from_config(&config.ai_engine)?;
    let pipeline = Pipeline::new(config, Arc::new(client)).context("initializing pipeline")?;
    Ok(Arc::new(pipeline))
}

/// Run the pipeline until Ctrl+C or SIGTERM
async fn run(config: AppConfig, skip_health_check: bool, no_web: bool) -> anyhow::Result<()> {
    info!("Ablage v{} starting", env!("CARGO_PKG_VERSION"));

    for dir in [&config.paths.inbox, &config.paths.ablage, &config.paths.processed] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
    }

    if !skip_health_check {
        let client = OllamaClient::from_config(&config.ai_engine)?;
        match client.model_available().await {
            Ok(true) => info!("Model '{}' available at {}", config.ai_engine.model, client.base_url()),
            Ok(false) => warn!("Model '{}' not found at {}", config.ai_engine.model, client.base_url()),
            // Suggestions degrade to the fallback ranking; keep going
            Err(e) => warn!("Inference backend unreachable ({}); suggestions will be degraded", e),
        }
    }

    let pipeline = build_pipeline(&config)?;
    info!("Extractors: {:?}", pipeline.extractors().extractor_names());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let (job_tx, job_rx) = mpsc::channel(config.pipeline.queue_capacity);
    let workers = pipeline::spawn_workers(Arc::clone(&pipeline), job_rx, config.pipeline.workers);
    info!("{} classification worker(s)", workers.len());

    let web_task = if config.web.enabled && !no_web {
        let web_config = config.web.clone();
        let web_pipeline = Arc::clone(&pipeline);
        let mut web_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = web_shutdown.changed().await;
            };
            if let Err(e) = web::start_server(&web_config, web_pipeline, shutdown).await {
                error!("Decision API stopped: {}", e);
            }
        }))
    } else {
        None
    };

    let dispatcher = Dispatcher::new(job_tx, config.pipeline.debounce());
    info!("Waiting for files in {:?}", config.paths.inbox);
    pipeline::watch_inbox(Arc::clone(&pipeline), dispatcher, shutdown_rx).await?;

    // The dispatcher (and its queue sender) is gone; workers drain and exit
    for worker in workers {
        let _ = worker.await;
    }
    if let Some(task) = web_task {
        let _ = task.await;
    }

    info!("Ablage stopped.");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// One-shot suggestion; nothing is recorded
async fn run_classify(config: AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let path = std::fs::canonicalize(&path).with_context(|| format!("reading {:?}", path))?;
    let pipeline = build_pipeline(&config)?;
    let (item, suggestion) = pipeline.suggest_for(&path).await?;

    if let Some(diagnostic) = &item.diagnostic {
        warn!("{}", diagnostic);
    }
    println!("{}", serde_json::to_string_pretty(&suggestion)?);
    Ok(())
}

fn run_history_command(config: AppConfig, action: HistoryCommands) -> anyhow::Result<()> {
    let audit = AuditLog::new(config.paths.audit_log());

    match action {
        HistoryCommands::List { count } => {
            let entries = audit.get_recent(count)?;
            println!("Recent placements ({} entries):", entries.len());
            for entry in entries {
                let marker = if entry.matched { " " } else { "*" };
                println!(
                    "  {} {} {} -> {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    marker,
                    entry.original_filename,
                    entry.destination.display()
                );
            }
        }
    }

    Ok(())
}

fn run_decisions_command(config: AppConfig, action: DecisionCommands) -> anyhow::Result<()> {
    let log = DecisionLog::open(config.paths.database())?;

    match action {
        DecisionCommands::Stats => {
            let stats = log.stats()?;
            println!("Decision Statistics:");
            println!("  Decisions: {}", stats.decisions);
            if stats.decisions > 0 {
                println!(
                    "  Top suggestion accepted: {} ({:.0}%)",
                    stats.matched_top,
                    stats.matched_top as f64 * 100.0 / stats.decisions as f64
                );
            }
            println!("  Degraded suggestions: {}", stats.degraded);
            println!("  Folders:");
            for (folder, count) in stats.folders {
                println!("    {:<24} {}", folder, count);
            }
        }
        DecisionCommands::Recent { count } => {
            for record in log.recent(count)? {
                println!(
                    "  {} {} -> {} (top: {})",
                    record.decided_at.format("%Y-%m-%d %H:%M"),
                    record.file_name,
                    record.chosen_folder,
                    record.top_folder.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Inbox: {:?}", config.paths.inbox);
            println!("  Ablage: {:?}", config.paths.ablage);
            println!("  Model: {}", config.ai_engine.model);
        }
    }

    Ok(())
}

async fn run_status(config: AppConfig) -> anyhow::Result<()> {
    let client = OllamaClient::from_config(&config.ai_engine)?;

    println!("Ablage v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");

    match client.health_check().await {
        Ok(()) => println!("Ollama: Running ({})", client.base_url()),
        Err(e) => println!("Ollama: Error - {}", e),
    }

    match client.list_models().await {
        Ok(models) => {
            println!("\nAvailable models:");
            for m in &models {
                let marker = if m.starts_with(config.ai_engine.model.as_str()) { "→" } else { " " };
                println!("  {} {}", marker, m);
            }
        }
        Err(e) => println!("  Error listing models: {}", e),
    }

    match DecisionLog::open(config.paths.database()).and_then(|log| log.stats()) {
        Ok(stats) => {
            println!("\nDecision log ({:?}):", config.paths.database());
            println!("  Decisions: {}", stats.decisions);
            println!("  Top suggestion accepted: {}", stats.matched_top);
        }
        Err(e) => println!("\nDecision log: Error - {}", e),
    }

    println!("\nConfiguration:");
    println!("  Inbox: {:?}", config.paths.inbox);
    println!("  Ablage: {:?}", config.paths.ablage);
    println!("  Model: {}", config.ai_engine.model);

    Ok(())
}
