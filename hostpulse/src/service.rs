use crate::bus::{CollectionEvent, EventStream, SnapshotBus};
use crate::config::MonitorConfig;
use crate::control;
use crate::error::{ControlError, Result};
use crate::history::{HistoryMetric, HistoryStore};
use crate::monitoring::MetricsProvider;
use crate::sampler::{run_loop, OptionalSources, ProcessSampler, SystemSampler};
use crate::types::{ProcessTable, Snapshot};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Runs the system and process samplers and exposes their latest output.
///
/// Consumers only read: snapshots and tables are immutable once published,
/// and history is copied out on every read.
pub struct Monitor {
    config: MonitorConfig,
    sources: OptionalSources,
    history: Arc<HistoryStore>,
    snapshots: Arc<SnapshotBus<Snapshot>>,
    process_tables: Arc<SnapshotBus<ProcessTable>>,
    events: Arc<EventStream>,
    stop_tx: watch::Sender<bool>,
    system_task: JoinHandle<SystemSampler>,
    process_task: JoinHandle<ProcessSampler>,
}

impl Monitor {
    /// Validates `config`, probes optional sources once and spawns both
    /// sampling loops. Must be called inside a tokio runtime.
    pub async fn start(config: MonitorConfig, provider: Arc<dyn MetricsProvider>) -> Result<Self> {
        let config = config.validate()?;

        info!(
            "Starting monitor: system every {}ms, processes every {}ms",
            config.tick_interval_ms, config.process_tick_interval_ms
        );

        let sources =
            OptionalSources::detect(provider.as_ref(), config.battery, config.temperature).await;

        let history = Arc::new(HistoryStore::new(config.history_capacity));
        let snapshots = Arc::new(SnapshotBus::new(Snapshot::empty()));
        let process_tables = Arc::new(SnapshotBus::new(ProcessTable::empty()));
        let events = Arc::new(EventStream::new(config.event_capacity));
        let (stop_tx, stop_rx) = watch::channel(false);

        let system_sampler = SystemSampler::new(
            provider.clone(),
            sources,
            history.clone(),
            snapshots.clone(),
            events.clone(),
        );
        let process_sampler = ProcessSampler::new(
            provider,
            config.process_fields(),
            process_tables.clone(),
            events.clone(),
        );

        let system_task = tokio::spawn(run_loop(
            system_sampler,
            config.tick_interval(),
            stop_rx.clone(),
        ));
        let process_task = tokio::spawn(run_loop(
            process_sampler,
            config.process_tick_interval(),
            stop_rx,
        ));

        Ok(Self {
            config,
            sources,
            history,
            snapshots,
            process_tables,
            events,
            stop_tx,
            system_task,
            process_task,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn sources(&self) -> OptionalSources {
        self.sources
    }

    pub fn latest_snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.latest()
    }

    pub fn latest_process_table(&self) -> Arc<ProcessTable> {
        self.process_tables.latest()
    }

    /// Always `history_capacity` values, oldest first.
    pub fn history_of(&self, metric: HistoryMetric) -> Vec<f64> {
        self.history.snapshot(metric)
    }

    pub fn history_metrics(&self) -> Vec<HistoryMetric> {
        self.history.metrics()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    pub fn events_emitted(&self) -> u64 {
        self.events.emitted()
    }

    /// Changes each time a new `Snapshot` is published.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<u64> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_process_tables(&self) -> watch::Receiver<u64> {
        self.process_tables.subscribe()
    }

    pub fn terminate(&self, pid: u32) -> std::result::Result<(), ControlError> {
        control::terminate(pid)
    }

    pub fn set_priority(&self, pid: u32, level: i32) -> std::result::Result<(), ControlError> {
        control::set_priority(pid, level)
    }

    /// Signals both loops to stop and waits for them. A tick in progress
    /// finishes before its loop exits.
    pub async fn shutdown(self) -> Result<()> {
        info!("Stopping monitor");
        self.stop_tx.send_replace(true);

        let system = self.system_task.await;
        let process = self.process_task.await;
        let (system, process) = (system?, process?);

        debug!(
            "Monitor stopped after {} system ticks and {} process ticks",
            system.ticks(),
            process.ticks()
        );
        Ok(())
    }
}
