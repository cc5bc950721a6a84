use super::{Sampler, TickOutcome};
use crate::bus::{EventSource, EventStream, SnapshotBus};
use crate::config::SourceMode;
use crate::history::{HistoryMetric, HistoryStore};
use crate::monitoring::MetricsProvider;
use crate::rate::{CounterKey, CounterStore, Metric, RawCounter};
use crate::types::{DiskIoRate, NetworkIoRate, Snapshot, TemperatureSummary};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Optional sources found at startup. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionalSources {
    pub battery: bool,
    pub temperature: bool,
}

impl OptionalSources {
    pub async fn detect(
        provider: &dyn MetricsProvider,
        battery: SourceMode,
        temperature: SourceMode,
    ) -> Self {
        let battery = match battery {
            SourceMode::On => true,
            SourceMode::Off => false,
            SourceMode::Auto => matches!(provider.battery_status().await, Ok(Some(_))),
        };
        let temperature = match temperature {
            SourceMode::On => true,
            SourceMode::Off => false,
            SourceMode::Auto => provider
                .temperature_sensors()
                .await
                .map(|sensors| !sensors.is_empty())
                .unwrap_or(false),
        };

        info!(
            "Optional sources: battery={}, temperature={}",
            battery, temperature
        );

        Self {
            battery,
            temperature,
        }
    }
}

/// Produces one `Snapshot` per tick and feeds the rolling history.
pub struct SystemSampler {
    provider: Arc<dyn MetricsProvider>,
    sources: OptionalSources,
    counters: CounterStore,
    history: Arc<HistoryStore>,
    bus: Arc<SnapshotBus<Snapshot>>,
    events: Arc<EventStream>,
    tick: u64,
}

impl SystemSampler {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        sources: OptionalSources,
        history: Arc<HistoryStore>,
        bus: Arc<SnapshotBus<Snapshot>>,
        events: Arc<EventStream>,
    ) -> Self {
        Self {
            provider,
            sources,
            counters: CounterStore::new(),
            history,
            bus,
            events,
            tick: 0,
        }
    }

    pub fn counters(&self) -> &CounterStore {
        &self.counters
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Reads and assembles one snapshot without publishing it.
    pub async fn sample(&mut self) -> Result<Snapshot> {
        let raw = self.provider.system_counters().await?;
        let at = raw.captured_at;

        let disk_io = match raw.disk_io {
            Some(io) => DiskIoRate {
                read_bytes_per_sec: self
                    .counters
                    .update(
                        CounterKey::system(Metric::DiskRead),
                        RawCounter::from_bytes(io.read_bytes, at),
                    )
                    .or_zero(),
                write_bytes_per_sec: self
                    .counters
                    .update(
                        CounterKey::system(Metric::DiskWrite),
                        RawCounter::from_bytes(io.write_bytes, at),
                    )
                    .or_zero(),
            },
            None => DiskIoRate::default(),
        };

        let network_io = NetworkIoRate {
            received_bytes_per_sec: self
                .counters
                .update(
                    CounterKey::system(Metric::NetReceived),
                    RawCounter::from_bytes(raw.network_io.received_bytes, at),
                )
                .or_zero(),
            transmitted_bytes_per_sec: self
                .counters
                .update(
                    CounterKey::system(Metric::NetTransmitted),
                    RawCounter::from_bytes(raw.network_io.transmitted_bytes, at),
                )
                .or_zero(),
            total_received_bytes: raw.network_io.received_bytes,
            total_transmitted_bytes: raw.network_io.transmitted_bytes,
        };

        let battery = if self.sources.battery {
            match self.provider.battery_status().await {
                Ok(battery) => battery,
                Err(e) => {
                    debug!("Battery unavailable this tick: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let temperature = if self.sources.temperature {
            match self.provider.temperature_sensors().await {
                Ok(sensors) if !sensors.is_empty() => Some(TemperatureSummary::from_sensors(sensors)),
                Ok(_) => None,
                Err(e) => {
                    debug!("Temperature sensors unavailable this tick: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Snapshot {
            tick: self.tick,
            captured_at: SystemTime::now(),
            cpu_total: raw.cpu_total,
            cpu_per_core: raw.cpu_per_core,
            memory: raw.memory,
            swap: raw.swap,
            partitions: raw.partitions,
            disk_io,
            network_io,
            battery,
            temperature,
            host: raw.host,
        })
    }

    fn chart_points(snapshot: &Snapshot) -> Vec<(HistoryMetric, f64)> {
        let mut points = vec![
            (HistoryMetric::CpuPercent, snapshot.cpu_total),
            (HistoryMetric::MemoryPercent, snapshot.memory.percent),
            (HistoryMetric::DiskRate, snapshot.disk_io.total()),
            (HistoryMetric::NetworkRate, snapshot.network_io.total()),
        ];
        points.extend(
            snapshot
                .cpu_per_core
                .iter()
                .enumerate()
                .map(|(core, usage)| (HistoryMetric::CoreCpuPercent(core), *usage)),
        );
        points
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn tick(&mut self) -> TickOutcome {
        self.tick += 1;

        match self.sample().await {
            Ok(snapshot) => {
                self.history.append_all(Self::chart_points(&snapshot));
                debug!(
                    "System tick {}: cpu={:.1}% mem={:.1}%",
                    snapshot.tick, snapshot.cpu_total, snapshot.memory.percent
                );
                self.bus.publish(snapshot);
                TickOutcome::Published
            }
            Err(e) => {
                warn!("System collection failed on tick {}: {}", self.tick, e);
                self.events.emit(
                    EventSource::System,
                    format!("system collection failed: {e}"),
                );
                TickOutcome::Skipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::fake::ScriptedProvider;
    use crate::monitoring::{IoCounters, NetCounters, SystemCounters};
    use crate::types::{
        BatteryReading, ChargeState, HostInfo, MemoryUsage, SwapUsage, TemperatureReading,
    };
    use std::time::{Duration, Instant};

    const GB: u64 = 1024 * 1024 * 1024;

    fn counters(at: Instant, cpu: f64, disk: u64, net: u64) -> SystemCounters {
        SystemCounters {
            captured_at: at,
            cpu_total: cpu,
            cpu_per_core: vec![cpu, cpu],
            memory: MemoryUsage::new(16 * GB, 8 * GB, 4 * GB, 8 * GB, Some(GB)),
            swap: SwapUsage::new(2 * GB, 0),
            partitions: Vec::new(),
            disk_io: Some(IoCounters {
                read_bytes: disk,
                write_bytes: disk,
            }),
            network_io: NetCounters {
                received_bytes: net,
                transmitted_bytes: 0,
            },
            host: HostInfo {
                logical_cores: 2,
                ..Default::default()
            },
        }
    }

    struct Harness {
        provider: Arc<ScriptedProvider>,
        sampler: SystemSampler,
        history: Arc<HistoryStore>,
        bus: Arc<SnapshotBus<Snapshot>>,
        events: Arc<EventStream>,
    }

    fn harness(sources: OptionalSources) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(2));
        let history = Arc::new(HistoryStore::new(4));
        let bus = Arc::new(SnapshotBus::new(Snapshot::empty()));
        let events = Arc::new(EventStream::new(8));
        let sampler = SystemSampler::new(
            provider.clone(),
            sources,
            history.clone(),
            bus.clone(),
            events.clone(),
        );
        Harness {
            provider,
            sampler,
            history,
            bus,
            events,
        }
    }

    #[tokio::test]
    async fn test_snapshot_reports_cpu_and_memory() {
        let mut h = harness(OptionalSources::default());
        h.provider.push_system(counters(Instant::now(), 42.0, 0, 0));

        assert_eq!(h.sampler.tick().await, TickOutcome::Published);

        let snapshot = h.bus.latest();
        assert_eq!(snapshot.cpu_total, 42.0);
        assert_eq!(snapshot.memory.percent, 50.0);
        assert_eq!(snapshot.tick, 1);
    }

    #[tokio::test]
    async fn test_first_tick_rates_are_zero_then_computed() {
        let mut h = harness(OptionalSources::default());
        let base = Instant::now();
        h.provider
            .push_system(counters(base, 10.0, 1_000, 5_000))
            .push_system(counters(base + Duration::from_secs(2), 10.0, 5_000, 9_000));

        h.sampler.tick().await;
        let first = h.bus.latest();
        assert_eq!(first.disk_io.read_bytes_per_sec, 0.0);
        assert_eq!(first.network_io.received_bytes_per_sec, 0.0);
        assert_eq!(first.network_io.total_received_bytes, 5_000);

        h.sampler.tick().await;
        let second = h.bus.latest();
        assert!((second.disk_io.read_bytes_per_sec - 2_000.0).abs() < 1e-6);
        assert!((second.disk_io.write_bytes_per_sec - 2_000.0).abs() < 1e-6);
        assert!((second.network_io.received_bytes_per_sec - 2_000.0).abs() < 1e-6);
        assert_eq!(second.network_io.transmitted_bytes_per_sec, 0.0);
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_previous_snapshot() {
        let mut h = harness(OptionalSources::default());
        let base = Instant::now();
        h.provider
            .push_system(counters(base, 30.0, 0, 0))
            .push_system_failure("sysctl exploded")
            .push_system(counters(base + Duration::from_secs(2), 60.0, 0, 0));

        h.sampler.tick().await;
        let before = h.bus.latest();

        assert_eq!(h.sampler.tick().await, TickOutcome::Skipped);
        let after = h.bus.latest();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(h.events.emitted(), 1);
        assert_eq!(h.bus.generation(), 1);
        assert_eq!(
            h.history.snapshot(HistoryMetric::CpuPercent),
            vec![0.0, 0.0, 0.0, 30.0]
        );

        assert_eq!(h.sampler.tick().await, TickOutcome::Published);
        assert_eq!(h.bus.latest().cpu_total, 60.0);
        assert_eq!(h.bus.latest().tick, 3);
    }

    #[tokio::test]
    async fn test_history_receives_chart_points() {
        let mut h = harness(OptionalSources::default());
        let base = Instant::now();
        h.provider
            .push_system(counters(base, 25.0, 0, 0))
            .push_system(counters(base + Duration::from_secs(1), 75.0, 512, 1024));

        h.sampler.tick().await;
        h.sampler.tick().await;

        assert_eq!(
            h.history.snapshot(HistoryMetric::CpuPercent),
            vec![0.0, 0.0, 25.0, 75.0]
        );
        assert_eq!(
            h.history.snapshot(HistoryMetric::MemoryPercent),
            vec![0.0, 0.0, 50.0, 50.0]
        );
        assert_eq!(h.history.snapshot(HistoryMetric::DiskRate)[3], 1024.0);
        assert_eq!(h.history.snapshot(HistoryMetric::NetworkRate)[3], 1024.0);
        assert_eq!(
            h.history.snapshot(HistoryMetric::CoreCpuPercent(1))[3],
            75.0
        );
    }

    #[tokio::test]
    async fn test_missing_disk_counters_report_zero_rate() {
        let mut h = harness(OptionalSources::default());
        let mut raw = counters(Instant::now(), 1.0, 0, 0);
        raw.disk_io = None;
        h.provider.push_system(raw);

        h.sampler.tick().await;

        assert_eq!(h.bus.latest().disk_io, DiskIoRate::default());
        assert!(!h.sampler.counters().is_empty());
    }

    #[tokio::test]
    async fn test_optional_sources_only_when_detected() {
        let mut h = harness(OptionalSources {
            battery: true,
            temperature: false,
        });
        h.provider
            .push_system(counters(Instant::now(), 1.0, 0, 0))
            .set_battery(Some(BatteryReading {
                percent: 80.0,
                state: ChargeState::Charging,
            }))
            .set_temperatures(vec![TemperatureReading {
                label: "coretemp".to_string(),
                celsius: 50.0,
            }]);

        h.sampler.tick().await;

        let snapshot = h.bus.latest();
        assert_eq!(snapshot.battery.as_ref().unwrap().percent, 80.0);
        assert!(snapshot.temperature.is_none());
    }

    #[tokio::test]
    async fn test_optional_source_failure_is_not_an_event() {
        let mut h = harness(OptionalSources {
            battery: true,
            temperature: true,
        });
        h.provider
            .push_system(counters(Instant::now(), 1.0, 0, 0))
            .set_battery_failure("acpi went away");

        assert_eq!(h.sampler.tick().await, TickOutcome::Published);

        let snapshot = h.bus.latest();
        assert!(snapshot.battery.is_none());
        assert!(snapshot.temperature.is_none());
        assert_eq!(h.events.emitted(), 0);
    }

    #[tokio::test]
    async fn test_detect_sources() {
        let provider = ScriptedProvider::new(1);
        provider.set_temperatures(vec![TemperatureReading {
            label: "k10temp Tctl".to_string(),
            celsius: 61.0,
        }]);

        let auto = OptionalSources::detect(&provider, SourceMode::Auto, SourceMode::Auto).await;
        assert!(!auto.battery);
        assert!(auto.temperature);

        let forced = OptionalSources::detect(&provider, SourceMode::On, SourceMode::Off).await;
        assert!(forced.battery);
        assert!(!forced.temperature);
    }
}
