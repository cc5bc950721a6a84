mod summary;

use anyhow::Result;
use hostpulse::monitoring::system::SysinfoProvider;
use hostpulse::{Monitor, MonitorConfig, Settings};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = MonitorConfig::load()?;

    // Initialize logging
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting hostpulse agent");
    info!(
        "System interval: {}ms, process interval: {}ms, history: {} points",
        config.tick_interval_ms, config.process_tick_interval_ms, config.history_capacity
    );

    let mut settings = match Settings::load(&config.settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(
                "Ignoring unreadable settings at {}: {}",
                config.settings_path.display(),
                e
            );
            Settings::default()
        }
    };
    settings.set("tick_interval_ms", config.tick_interval_ms);

    let provider = Arc::new(SysinfoProvider::new());
    let monitor = Monitor::start(config.clone(), provider).await?;

    let sources = monitor.sources();
    info!(
        "Battery {}, temperature {}",
        if sources.battery { "enabled" } else { "disabled" },
        if sources.temperature { "enabled" } else { "disabled" }
    );

    let mut snapshots = monitor.subscribe_snapshots();
    let mut events = monitor.subscribe_events();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Received shutdown signal, exiting...");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = monitor.latest_snapshot();
                let table = monitor.latest_process_table();
                info!("{}", summary::status_line(&snapshot, &table));
            }
            event = events.recv() => match event {
                Ok(event) => warn!("{} collection failed: {}", event.source, event.message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} collection events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    monitor.shutdown().await?;

    if let Err(e) = settings.save(&config.settings_path) {
        warn!(
            "Failed to save settings to {}: {}",
            config.settings_path.display(),
            e
        );
    } else {
        debug!("Settings saved to {}", config.settings_path.display());
    }

    Ok(())
}
