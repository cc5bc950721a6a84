use super::metrics::{FieldRead, IoCounters, NetCounters, ProcessProbe, SystemCounters};
use super::{MetricsProvider, ProcessFields};
use crate::error::{FieldError, ProbeError};
use crate::types::{
    BatteryReading, ChargeState, HostInfo, MemoryUsage, PartitionUsage, ProcessStatus, SwapUsage,
    TemperatureReading,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Instant;
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, Networks, Pid, ProcessRefreshKind,
    ProcessesToUpdate, RefreshKind, System, UpdateKind, Users,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Production provider backed by `sysinfo`, with Linux `/proc` and `/sys`
/// readers for what `sysinfo` does not expose.
///
/// Process CPU usage is computed against the CPU window of the `System`
/// that refreshed the processes, so the process table gets its own
/// `System` and never shares refreshes with the system-wide counters.
pub struct SysinfoProvider {
    system: Mutex<System>,
    processes: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
    components: Mutex<Components>,
    users: Mutex<Users>,
    core_count: usize,
    physical_cores: Option<usize>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        let core_count = system.cpus().len().max(1);
        let physical_cores = system.physical_core_count();

        let processes = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );

        Self {
            system: Mutex::new(system),
            processes: Mutex::new(processes),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            components: Mutex::new(Components::new_with_refreshed_list()),
            users: Mutex::new(Users::new_with_refreshed_list()),
            core_count,
            physical_cores,
        }
    }

    async fn collect_partitions(&self) -> Vec<PartitionUsage> {
        let mut disks = self.disks.lock().await;
        disks.refresh_list();

        disks
            .iter()
            .map(|d| {
                PartitionUsage::new(
                    d.name().to_string_lossy(),
                    d.mount_point(),
                    d.file_system().to_string_lossy(),
                    d.total_space(),
                    d.available_space(),
                )
            })
            .collect()
    }

    async fn collect_network(&self) -> NetCounters {
        let mut networks = self.networks.lock().await;
        networks.refresh_list();

        networks
            .iter()
            .fold(NetCounters::default(), |acc, (_, data)| NetCounters {
                received_bytes: acc.received_bytes.saturating_add(data.total_received()),
                transmitted_bytes: acc
                    .transmitted_bytes
                    .saturating_add(data.total_transmitted()),
            })
    }

    #[cfg(target_os = "linux")]
    async fn count_processes(&self) -> usize {
        match std::fs::read_dir("/proc") {
            Ok(entries) => count_pid_entries(
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned()),
            ),
            Err(e) => {
                debug!("Failed to read /proc: {}", e);
                0
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    async fn count_processes(&self) -> usize {
        let mut sys = self.system.lock().await;
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
        sys.processes()
            .values()
            .filter(|p| p.thread_kind().is_none())
            .count()
    }

    async fn lookup_user(&self, uid: Option<&sysinfo::Uid>) -> FieldRead<String> {
        let uid = uid.ok_or(FieldError::AccessDenied)?;
        let users = self.users.lock().await;
        users
            .get_user_by_id(uid)
            .map(|u| u.name().to_string())
            .ok_or(FieldError::NotFound)
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    async fn list_processes(&self) -> Result<Vec<u32>> {
        let mut sys = self.processes.lock().await;
        sys.refresh_memory_specifics(MemoryRefreshKind::new().with_ram());
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_cpu()
                .with_memory()
                .with_disk_usage()
                .with_user(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_cwd(UpdateKind::Always),
        );

        let pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, p)| p.thread_kind().is_none())
            .map(|(pid, _)| pid.as_u32())
            .collect();

        // Every host has at least one visible process; none means the
        // process table itself could not be read.
        if pids.is_empty() {
            return Err(anyhow!("process enumeration returned no processes"));
        }

        Ok(pids)
    }

    async fn process_info(
        &self,
        pid: u32,
        fields: &ProcessFields,
    ) -> std::result::Result<ProcessProbe, ProbeError> {
        let (mut probe, uid) = {
            let sys = self.processes.lock().await;
            let process = sys
                .process(Pid::from_u32(pid))
                .ok_or(ProbeError::NotFound(pid))?;

            let memory_bytes = process.memory();
            let total_memory = sys.total_memory();
            let memory_percent = if total_memory == 0 {
                0.0
            } else {
                memory_bytes as f64 / total_memory as f64 * 100.0
            };

            let mut probe = ProcessProbe::new(
                pid,
                process.name().to_string_lossy(),
                map_status(process.status()),
                process.cpu_usage() as f64,
                memory_bytes,
                memory_percent,
            )
            .captured_at(Instant::now());

            if fields.io {
                let usage = process.disk_usage();
                probe.io = Ok(IoCounters {
                    read_bytes: usage.total_read_bytes,
                    write_bytes: usage.total_written_bytes,
                });
            }
            if fields.network {
                probe.network = Err(FieldError::Unsupported);
            }
            if fields.start_time {
                probe.start_time = match process.start_time() {
                    0 => Err(FieldError::NotFound),
                    secs => Ok(secs),
                };
            }
            if fields.cwd {
                probe.cwd = process
                    .cwd()
                    .map(|p| p.to_path_buf())
                    .ok_or(FieldError::AccessDenied);
            }
            if fields.cmdline {
                let cmd = process.cmd();
                probe.cmdline = if cmd.is_empty() {
                    Err(FieldError::AccessDenied)
                } else {
                    Ok(cmd.iter().map(|a| a.to_string_lossy().into_owned()).collect())
                };
            }

            (probe, process.user_id().cloned())
        };

        if fields.user {
            probe.user = self.lookup_user(uid.as_ref()).await;
        }
        if fields.connections {
            probe.connections = count_sockets(pid);
        }

        Ok(probe)
    }

    async fn system_counters(&self) -> Result<SystemCounters> {
        let (cpu_total, cpu_per_core, memory, swap, cpu_frequency_mhz) = {
            let mut sys = self.system.lock().await;
            sys.refresh_specifics(
                RefreshKind::new()
                    .with_cpu(CpuRefreshKind::new().with_cpu_usage().with_frequency())
                    .with_memory(MemoryRefreshKind::everything()),
            );

            let cpu_per_core: Vec<f64> = sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect();
            if cpu_per_core.is_empty() {
                return Err(anyhow!("no CPU information available"));
            }
            if sys.total_memory() == 0 {
                return Err(anyhow!("no memory information available"));
            }

            let memory = MemoryUsage::new(
                sys.total_memory(),
                sys.used_memory(),
                sys.free_memory(),
                sys.available_memory(),
                read_cached_memory(),
            );
            let swap = SwapUsage::new(sys.total_swap(), sys.used_swap());
            let frequency = sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);

            (
                sys.global_cpu_usage() as f64,
                cpu_per_core,
                memory,
                swap,
                frequency,
            )
        };
        let process_count = self.count_processes().await;

        let partitions = self.collect_partitions().await;
        let network_io = self.collect_network().await;
        let disk_io = read_disk_io();

        Ok(SystemCounters {
            captured_at: Instant::now(),
            cpu_total,
            cpu_per_core,
            memory,
            swap,
            partitions,
            disk_io,
            network_io,
            host: HostInfo {
                logical_cores: self.core_count,
                physical_cores: self.physical_cores,
                cpu_frequency_mhz,
                uptime_secs: System::uptime(),
                boot_time_secs: System::boot_time(),
                process_count,
            },
        })
    }

    async fn battery_status(&self) -> Result<Option<BatteryReading>> {
        read_battery()
    }

    async fn temperature_sensors(&self) -> Result<Vec<TemperatureReading>> {
        let mut components = self.components.lock().await;
        components.refresh_list();

        Ok(components
            .iter()
            .filter(|c| c.temperature().is_finite())
            .map(|c| TemperatureReading {
                label: c.label().to_string(),
                celsius: c.temperature() as f64,
            })
            .collect())
    }

    fn core_count(&self) -> usize {
        self.core_count
    }
}

fn map_status(status: sysinfo::ProcessStatus) -> ProcessStatus {
    use sysinfo::ProcessStatus as Os;

    match status {
        Os::Run => ProcessStatus::Running,
        Os::Sleep | Os::Idle | Os::UninterruptibleDiskSleep => ProcessStatus::Sleeping,
        Os::Stop | Os::Tracing => ProcessStatus::Stopped,
        Os::Zombie | Os::Dead => ProcessStatus::Zombie,
        _ => ProcessStatus::Unknown,
    }
}

#[cfg(target_os = "linux")]
fn count_sockets(pid: u32) -> FieldRead<u32> {
    let entries = std::fs::read_dir(format!("/proc/{pid}/fd")).map_err(field_error)?;

    let sockets = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| std::fs::read_link(e.path()).ok())
        .filter(|target| target.to_string_lossy().starts_with("socket:"))
        .count();

    Ok(sockets as u32)
}

#[cfg(not(target_os = "linux"))]
fn count_sockets(_pid: u32) -> FieldRead<u32> {
    Err(FieldError::Unsupported)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn field_error(err: std::io::Error) -> FieldError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => FieldError::AccessDenied,
        _ => FieldError::NotFound,
    }
}

/// Counts numeric `/proc` entries. Threads live under `/proc/<pid>/task`
/// and are not listed at the top level.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn count_pid_entries<I>(names: I) -> usize
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    names
        .into_iter()
        .filter(|name| {
            let name = name.as_ref();
            !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
        })
        .count()
}

#[cfg(target_os = "linux")]
fn read_cached_memory() -> Option<u64> {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|contents| parse_meminfo_cached(&contents))
}

#[cfg(not(target_os = "linux"))]
fn read_cached_memory() -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn read_disk_io() -> Option<IoCounters> {
    match std::fs::read_to_string("/proc/diskstats") {
        Ok(contents) => Some(parse_diskstats(&contents, |name| {
            std::path::Path::new("/sys/block").join(name).exists()
        })),
        Err(e) => {
            debug!("Failed to read /proc/diskstats: {}", e);
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_disk_io() -> Option<IoCounters> {
    None
}

#[cfg(target_os = "linux")]
fn read_battery() -> Result<Option<BatteryReading>> {
    use std::fs;

    let entries = match fs::read_dir("/sys/class/power_supply") {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let kind = fs::read_to_string(path.join("type")).unwrap_or_default();
        if kind.trim() != "Battery" {
            continue;
        }

        let Some(percent) = fs::read_to_string(path.join("capacity"))
            .ok()
            .and_then(|c| c.trim().parse::<f64>().ok())
        else {
            debug!("Battery {} has no readable capacity", path.display());
            continue;
        };
        let status = fs::read_to_string(path.join("status")).unwrap_or_default();

        return Ok(Some(BatteryReading {
            percent: percent.clamp(0.0, 100.0),
            state: parse_charge_state(&status),
        }));
    }

    Ok(None)
}

#[cfg(not(target_os = "linux"))]
fn read_battery() -> Result<Option<BatteryReading>> {
    Ok(None)
}

/// `Cached:` line of `/proc/meminfo`, in bytes.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo_cached(contents: &str) -> Option<u64> {
    contents
        .lines()
        .find(|line| line.starts_with("Cached:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Sums sectors read/written over whole disks in `/proc/diskstats`.
/// Partitions are skipped so their I/O is not counted twice.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_diskstats(contents: &str, is_whole_disk: impl Fn(&str) -> bool) -> IoCounters {
    const SECTOR_SIZE: u64 = 512;

    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let name = fields[2];
            if name.starts_with("loop") || name.starts_with("ram") || !is_whole_disk(name) {
                return None;
            }
            let sectors_read: u64 = fields[5].parse().ok()?;
            let sectors_written: u64 = fields[9].parse().ok()?;
            Some((sectors_read, sectors_written))
        })
        .fold(IoCounters::default(), |acc, (read, written)| IoCounters {
            read_bytes: acc.read_bytes.saturating_add(read * SECTOR_SIZE),
            write_bytes: acc.write_bytes.saturating_add(written * SECTOR_SIZE),
        })
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_charge_state(status: &str) -> ChargeState {
    match status.trim() {
        "Charging" => ChargeState::Charging,
        "Discharging" | "Not charging" => ChargeState::Discharging,
        "Full" => ChargeState::Full,
        _ => ChargeState::Unknown,
    }
}
