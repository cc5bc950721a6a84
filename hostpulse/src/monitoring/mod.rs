pub mod fake;
pub mod metrics;
pub mod profiles;
pub mod system;

pub use metrics::{FieldRead, IoCounters, NetCounters, ProcessProbe, SystemCounters};

use crate::error::ProbeError;
use crate::types::{BatteryReading, TemperatureReading};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Optional per-process attributes a sampler asks the provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFields {
    pub user: bool,
    pub io: bool,
    pub network: bool,
    pub connections: bool,
    pub start_time: bool,
    pub cwd: bool,
    pub cmdline: bool,
}

/// The OS capabilities the engine consumes. Every call is fallible and may
/// be partially available.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn list_processes(&self) -> Result<Vec<u32>>;

    /// Reads one process. Identity, status, CPU and memory are mandatory;
    /// everything in `fields` is read independently and may fail on its own.
    async fn process_info(
        &self,
        pid: u32,
        fields: &ProcessFields,
    ) -> std::result::Result<ProcessProbe, ProbeError>;

    async fn system_counters(&self) -> Result<SystemCounters>;

    /// `Ok(None)` when the host has no battery.
    async fn battery_status(&self) -> Result<Option<BatteryReading>>;

    async fn temperature_sensors(&self) -> Result<Vec<TemperatureReading>>;

    fn core_count(&self) -> usize;
}
