use crate::rate::Rate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_bytes: Option<u64>,
    pub percent: f64,
}

impl MemoryUsage {
    pub fn new(
        total_bytes: u64,
        used_bytes: u64,
        free_bytes: u64,
        available_bytes: u64,
        cached_bytes: Option<u64>,
    ) -> Self {
        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            available_bytes,
            cached_bytes,
            percent: percent_of(used_bytes, total_bytes),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
}

impl SwapUsage {
    pub fn new(total_bytes: u64, used_bytes: u64) -> Self {
        Self {
            total_bytes,
            used_bytes,
            free_bytes: total_bytes.saturating_sub(used_bytes),
            percent: percent_of(used_bytes, total_bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionUsage {
    pub device: String,
    pub mount_point: PathBuf,
    pub file_system: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
}

impl PartitionUsage {
    pub fn new(
        device: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        file_system: impl Into<String>,
        total_bytes: u64,
        free_bytes: u64,
    ) -> Self {
        let used_bytes = total_bytes.saturating_sub(free_bytes);
        Self {
            device: device.into(),
            mount_point: mount_point.into(),
            file_system: file_system.into(),
            total_bytes,
            used_bytes,
            free_bytes,
            percent: percent_of(used_bytes, total_bytes),
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskIoRate {
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

impl DiskIoRate {
    pub fn total(&self) -> f64 {
        self.read_bytes_per_sec + self.write_bytes_per_sec
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkIoRate {
    pub received_bytes_per_sec: f64,
    pub transmitted_bytes_per_sec: f64,
    pub total_received_bytes: u64,
    pub total_transmitted_bytes: u64,
}

impl NetworkIoRate {
    pub fn total(&self) -> f64 {
        self.received_bytes_per_sec + self.transmitted_bytes_per_sec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeState {
    Charging,
    Discharging,
    Full,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub percent: f64,
    pub state: ChargeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub label: String,
    pub celsius: f64,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_celsius: Option<f64>,
    pub sensors: Vec<TemperatureReading>,
}

impl TemperatureSummary {
    const CPU_LABEL_HINTS: [&'static str; 5] = ["coretemp", "package", "tctl", "k10temp", "cpu"];

    /// Picks the CPU reading by label, falling back to the first sensor.
    pub fn from_sensors(sensors: Vec<TemperatureReading>) -> Self {
        let cpu_celsius = Self::CPU_LABEL_HINTS
            .iter()
            .find_map(|hint| {
                sensors
                    .iter()
                    .find(|s| s.label.to_lowercase().contains(hint))
            })
            .or_else(|| sensors.first())
            .map(|s| s.celsius);

        Self {
            cpu_celsius,
            sensors,
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub logical_cores: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_cores: Option<usize>,
    pub cpu_frequency_mhz: u64,
    pub uptime_secs: u64,
    pub boot_time_secs: u64,
    pub process_count: usize,
}

/// One tick's system-wide metrics. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub captured_at: SystemTime,
    pub cpu_total: f64,
    pub cpu_per_core: Vec<f64>,
    pub memory: MemoryUsage,
    pub swap: SwapUsage,
    pub partitions: Vec<PartitionUsage>,
    pub disk_io: DiskIoRate,
    pub network_io: NetworkIoRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureSummary>,
    pub host: HostInfo,
}

impl Snapshot {
    /// Baseline published before the first tick completes.
    pub fn empty() -> Self {
        Self {
            tick: 0,
            captured_at: SystemTime::UNIX_EPOCH,
            cpu_total: 0.0,
            cpu_per_core: Vec::new(),
            memory: MemoryUsage::default(),
            swap: SwapUsage::default(),
            partitions: Vec::new(),
            disk_io: DiskIoRate::default(),
            network_io: NetworkIoRate::default(),
            battery: None,
            temperature: None,
            host: HostInfo::default(),
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.tick == 0
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    Unknown,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Sleeping => "sleeping",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Zombie => "zombie",
            ProcessStatus::Unknown => "unknown",
        }
    }
}

/// Latest state of one process. `None` fields were not readable this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub status: ProcessStatus,
    pub user: Option<String>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_bytes: u64,
    /// Read + write bytes per second.
    pub disk_io: Rate,
    /// Received + transmitted bytes per second.
    pub network: Rate,
    pub connection_count: Option<u32>,
    /// Seconds since the Unix epoch.
    pub start_time: Option<u64>,
    pub cwd: Option<PathBuf>,
    pub cmdline: Option<Vec<String>>,
}

/// One tick's processes keyed by pid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTable {
    pub tick: u64,
    pub captured_at: SystemTime,
    pub core_count: usize,
    records: HashMap<u32, ProcessRecord>,
}

impl ProcessTable {
    pub fn new(tick: u64, core_count: usize, records: HashMap<u32, ProcessRecord>) -> Self {
        Self {
            tick,
            captured_at: SystemTime::now(),
            core_count,
            records,
        }
    }

    pub fn empty() -> Self {
        Self {
            tick: 0,
            captured_at: SystemTime::UNIX_EPOCH,
            core_count: 0,
            records: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.records.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Highest CPU consumers first; ties are ordered by pid.
    pub fn top_by_cpu(&self, n: usize) -> Vec<&ProcessRecord> {
        let mut records: Vec<&ProcessRecord> = self.records.values().collect();
        records.sort_by(|a, b| {
            b.cpu_percent
                .partial_cmp(&a.cpu_percent)
                .unwrap_or(Ordering::Equal)
                .then(a.pid.cmp(&b.pid))
        });
        records.truncate(n);
        records
    }

    /// Sum of per-process CPU capped at `100 * core_count`. This is an
    /// approximation, not the kernel's own accounting.
    pub fn total_cpu_percent(&self) -> f64 {
        let sum: f64 = self.records.values().map(|r| r.cpu_percent).sum();
        let cap = 100.0 * self.core_count.max(1) as f64;
        sum.min(cap)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::empty()
    }
}
