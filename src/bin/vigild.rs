//! vigild - the vigil monitoring daemon.
//!
//! Startup order matters: database schema first, then the registries,
//! then the scheduler. Errors during startup are fatal.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

use vigil::config::{Config, DatabaseConfig, LogTarget, read_config_file};
use vigil::db::Database;
use vigil::engine::ActiveMonitorManager;
use vigil::event::EventBus;
use vigil::notify::NotificationManager;
use vigil::stats;

#[derive(Debug, Clone, Parser)]
#[command(about = "vigil - a small API driven monitoring server")]
struct Args {
    /// Config file
    #[arg(short, long)]
    config: String,

    /// Debug mode, debug logging etc
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(config: &Config, debug: bool) -> anyhow::Result<()> {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let targets = filter::Targets::new().with_targets(vec![("vigil", level), ("vigild", level)]);
    match &config.log.target {
        LogTarget::Stdout => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().compact())
                .with(targets)
                .init();
        }
        LogTarget::File { path } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .with(targets)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = read_config_file(&args.config)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;

    let debug = args.debug || config.monitoring.debug;
    init_logging(&config, debug)?;
    trace!("started with args: {args:?}");
    info!(
        "vigil starting (management port {}, max concurrent jobs {})",
        config.listen_port, config.monitoring.max_concurrent_jobs
    );

    let DatabaseConfig::Sqlite { path } = &config.database;
    let db = Database::connect(path).await?;
    db.initialize().await?;

    let notifier = Arc::new(NotificationManager::new(config.notifications.as_ref()));
    let events = EventBus::new();
    let manager = ActiveMonitorManager::new(
        db.clone(),
        notifier,
        events,
        config.monitoring.max_concurrent_jobs,
        debug,
    );
    manager.initialize().await?;
    manager.start();

    stats::set("global", "startup_ts", chrono::Utc::now().timestamp());
    info!("vigil startup complete");

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal, stopping");
    manager.shutdown();
    db.close().await;
    Ok(())
}
