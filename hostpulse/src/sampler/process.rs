use super::{Sampler, TickOutcome};
use crate::bus::{EventSource, EventStream, SnapshotBus};
use crate::error::ProbeError;
use crate::monitoring::{MetricsProvider, ProcessFields, ProcessProbe};
use crate::rate::{CounterKey, CounterStore, Metric, Rate, RawCounter};
use crate::types::{ProcessRecord, ProcessTable};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Produces one `ProcessTable` per tick.
pub struct ProcessSampler {
    provider: Arc<dyn MetricsProvider>,
    fields: ProcessFields,
    counters: CounterStore,
    known: HashSet<u32>,
    bus: Arc<SnapshotBus<ProcessTable>>,
    events: Arc<EventStream>,
    tick: u64,
}

impl ProcessSampler {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        fields: ProcessFields,
        bus: Arc<SnapshotBus<ProcessTable>>,
        events: Arc<EventStream>,
    ) -> Self {
        Self {
            provider,
            fields,
            counters: CounterStore::new(),
            known: HashSet::new(),
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

    /// Enumerates and reads every process without publishing. Fails only
    /// when the enumeration itself fails.
    pub async fn sample(&mut self) -> Result<ProcessTable> {
        let pids = self.provider.list_processes().await?;

        let mut records = HashMap::with_capacity(pids.len());
        for pid in pids {
            match self.provider.process_info(pid, &self.fields).await {
                Ok(probe) => {
                    let record = self.record_from(probe);
                    records.insert(pid, record);
                }
                Err(ProbeError::NotFound(_)) => trace!("Process {} exited during scan", pid),
                Err(ProbeError::AccessDenied(_)) => trace!("Process {} is not accessible", pid),
            }
        }

        let alive: HashSet<u32> = records.keys().copied().collect();
        let exited = self.known.difference(&alive).count();
        if exited > 0 {
            debug!("{} processes exited since last tick", exited);
        }
        self.counters.retain_processes(&alive);
        self.known = alive;

        Ok(ProcessTable::new(
            self.tick,
            self.provider.core_count(),
            records,
        ))
    }

    fn record_from(&mut self, probe: ProcessProbe) -> ProcessRecord {
        let pid = probe.pid;
        let at = probe.captured_at;

        let disk_io = match &probe.io {
            Ok(io) => self.counters.update(
                CounterKey::process(pid, Metric::ProcessIo),
                RawCounter::from_bytes(io.total(), at),
            ),
            Err(_) => Rate::Unavailable,
        };
        let network = match &probe.network {
            Ok(net) => self.counters.update(
                CounterKey::process(pid, Metric::ProcessNet),
                RawCounter::from_bytes(net.total(), at),
            ),
            Err(_) => Rate::Unavailable,
        };

        ProcessRecord {
            pid,
            name: probe.name,
            status: probe.status,
            user: probe.user.ok(),
            cpu_percent: probe.cpu_percent,
            memory_percent: probe.memory_percent,
            memory_bytes: probe.memory_bytes,
            disk_io,
            network,
            connection_count: probe.connections.ok(),
            start_time: probe.start_time.ok(),
            cwd: probe.cwd.ok(),
            cmdline: probe.cmdline.ok(),
        }
    }
}

#[async_trait]
impl Sampler for ProcessSampler {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn tick(&mut self) -> TickOutcome {
        self.tick += 1;

        match self.sample().await {
            Ok(table) => {
                debug!("Process tick {}: {} processes", table.tick, table.len());
                self.bus.publish(table);
                TickOutcome::Published
            }
            Err(e) => {
                warn!("Process enumeration failed on tick {}: {}", self.tick, e);
                self.events.emit(
                    EventSource::Processes,
                    format!("process enumeration failed: {e}"),
                );
                TickOutcome::Skipped
            }
        }
    }
}
