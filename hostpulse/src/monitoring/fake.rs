use super::metrics::{ProcessProbe, SystemCounters};
use super::{MetricsProvider, ProcessFields};
use crate::error::ProbeError;
use crate::types::{BatteryReading, TemperatureReading};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What one process enumeration returns.
#[derive(Debug, Clone, Default)]
pub struct ProcessFrame {
    probes: Vec<ProcessProbe>,
    vanished: Vec<u32>,
    denied: Vec<u32>,
}

impl ProcessFrame {
    pub fn new(probes: Vec<ProcessProbe>) -> Self {
        Self {
            probes,
            vanished: Vec::new(),
            denied: Vec::new(),
        }
    }

    /// Listed by the enumeration but gone before its details are read.
    pub fn with_vanished(mut self, pid: u32) -> Self {
        self.vanished.push(pid);
        self
    }

    /// Listed by the enumeration but not readable at all.
    pub fn with_denied(mut self, pid: u32) -> Self {
        self.denied.push(pid);
        self
    }
}

#[derive(Default)]
struct Script {
    system: VecDeque<std::result::Result<SystemCounters, String>>,
    last_system: Option<std::result::Result<SystemCounters, String>>,
    processes: VecDeque<std::result::Result<ProcessFrame, String>>,
    last_processes: Option<std::result::Result<ProcessFrame, String>>,
    current: HashMap<u32, ProcessProbe>,
    denied: HashSet<u32>,
    battery: Option<std::result::Result<Option<BatteryReading>, String>>,
    temperatures: Option<std::result::Result<Vec<TemperatureReading>, String>>,
    system_reads: usize,
    process_listings: usize,
}

/// Scripted provider for tests and demos. Each call to `system_counters` or
/// `list_processes` consumes the next scripted step; once a script runs
/// out, its last step repeats.
pub struct ScriptedProvider {
    core_count: usize,
    script: Mutex<Script>,
}

impl ScriptedProvider {
    pub fn new(core_count: usize) -> Self {
        Self {
            core_count: core_count.max(1),
            script: Mutex::new(Script::default()),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_system(&self, counters: SystemCounters) -> &Self {
        self.script().system.push_back(Ok(counters));
        self
    }

    pub fn push_system_failure(&self, reason: impl Into<String>) -> &Self {
        self.script().system.push_back(Err(reason.into()));
        self
    }

    pub fn push_processes(&self, frame: ProcessFrame) -> &Self {
        self.script().processes.push_back(Ok(frame));
        self
    }

    pub fn push_process_failure(&self, reason: impl Into<String>) -> &Self {
        self.script().processes.push_back(Err(reason.into()));
        self
    }

    pub fn set_battery(&self, battery: Option<BatteryReading>) -> &Self {
        self.script().battery = Some(Ok(battery));
        self
    }

    pub fn set_battery_failure(&self, reason: impl Into<String>) -> &Self {
        self.script().battery = Some(Err(reason.into()));
        self
    }

    pub fn set_temperatures(&self, sensors: Vec<TemperatureReading>) -> &Self {
        self.script().temperatures = Some(Ok(sensors));
        self
    }

    pub fn system_reads(&self) -> usize {
        self.script().system_reads
    }

    pub fn process_listings(&self) -> usize {
        self.script().process_listings
    }

    fn next<T: Clone>(
        queue: &mut VecDeque<std::result::Result<T, String>>,
        last: &mut Option<std::result::Result<T, String>>,
    ) -> Option<std::result::Result<T, String>> {
        match queue.pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                Some(step)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl MetricsProvider for ScriptedProvider {
    async fn list_processes(&self) -> Result<Vec<u32>> {
        let mut script = self.script();
        script.process_listings += 1;

        let Script {
            processes,
            last_processes,
            ..
        } = &mut *script;
        let frame = match Self::next(processes, last_processes) {
            Some(Ok(frame)) => frame,
            Some(Err(reason)) => return Err(anyhow!(reason)),
            None => return Err(anyhow!("no process frame scripted")),
        };

        let mut pids: Vec<u32> = frame.probes.iter().map(|p| p.pid).collect();
        pids.extend(frame.vanished.iter().copied());
        pids.extend(frame.denied.iter().copied());

        script.current = frame.probes.into_iter().map(|p| (p.pid, p)).collect();
        script.denied = frame.denied.into_iter().collect();

        Ok(pids)
    }

    async fn process_info(
        &self,
        pid: u32,
        fields: &ProcessFields,
    ) -> std::result::Result<ProcessProbe, ProbeError> {
        let script = self.script();
        if script.denied.contains(&pid) {
            return Err(ProbeError::AccessDenied(pid));
        }
        script
            .current
            .get(&pid)
            .cloned()
            .map(|probe| probe.mask(fields))
            .ok_or(ProbeError::NotFound(pid))
    }

    async fn system_counters(&self) -> Result<SystemCounters> {
        let mut script = self.script();
        script.system_reads += 1;

        let Script {
            system,
            last_system,
            ..
        } = &mut *script;
        match Self::next(system, last_system) {
            Some(Ok(counters)) => Ok(counters),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Err(anyhow!("no system counters scripted")),
        }
    }

    async fn battery_status(&self) -> Result<Option<BatteryReading>> {
        match self.script().battery.clone() {
            Some(Ok(battery)) => Ok(battery),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(None),
        }
    }

    async fn temperature_sensors(&self) -> Result<Vec<TemperatureReading>> {
        match self.script().temperatures.clone() {
            Some(Ok(sensors)) => Ok(sensors),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(Vec::new()),
        }
    }

    fn core_count(&self) -> usize {
        self.core_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::types::ProcessStatus;

    fn probe(pid: u32) -> ProcessProbe {
        ProcessProbe::new(pid, "worker", ProcessStatus::Running, 1.0, 10, 0.5)
            .with_cmdline(Ok(vec!["worker".to_string()]))
    }

    #[tokio::test]
    async fn test_process_frame_lists_every_pid() {
        let provider = ScriptedProvider::new(2);
        provider.push_processes(
            ProcessFrame::new(vec![probe(1), probe(2)])
                .with_vanished(3)
                .with_denied(4),
        );

        let mut pids = provider.list_processes().await.unwrap();
        pids.sort();
        assert_eq!(pids, vec![1, 2, 3, 4]);

        let fields = ProcessFields::all();
        assert!(provider.process_info(1, &fields).await.is_ok());
        assert_eq!(
            provider.process_info(3, &fields).await.unwrap_err(),
            ProbeError::NotFound(3)
        );
        assert_eq!(
            provider.process_info(4, &fields).await.unwrap_err(),
            ProbeError::AccessDenied(4)
        );
    }

    #[tokio::test]
    async fn test_process_info_masks_fields() {
        let provider = ScriptedProvider::new(1);
        provider.push_processes(ProcessFrame::new(vec![probe(5)]));
        provider.list_processes().await.unwrap();

        let probe = provider
            .process_info(5, &ProcessFields::none())
            .await
            .unwrap();
        assert_eq!(probe.cmdline, Err(FieldError::NotRequested));
    }

    #[tokio::test]
    async fn test_last_step_repeats() {
        let provider = ScriptedProvider::new(1);
        provider
            .push_process_failure("first")
            .push_processes(ProcessFrame::new(vec![probe(9)]));

        assert!(provider.list_processes().await.is_err());
        assert_eq!(provider.list_processes().await.unwrap(), vec![9]);
        assert_eq!(provider.list_processes().await.unwrap(), vec![9]);
        assert_eq!(provider.process_listings(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_calls() {
        let provider = ScriptedProvider::new(0);

        assert_eq!(provider.core_count(), 1);
        assert!(provider.system_counters().await.is_err());
        assert_eq!(provider.battery_status().await.unwrap(), None);
        assert!(provider.temperature_sensors().await.unwrap().is_empty());
        assert_eq!(provider.system_reads(), 1);
    }
}
