use super::ProcessFields;
use crate::error::FieldError;
use crate::types::{HostInfo, MemoryUsage, PartitionUsage, ProcessStatus, SwapUsage};
use std::path::PathBuf;
use std::time::Instant;

/// Result of reading one optional attribute.
pub type FieldRead<T> = std::result::Result<T, FieldError>;

/// Cumulative byte counters for reads and writes.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl IoCounters {
    pub fn total(&self) -> u64 {
        self.read_bytes.saturating_add(self.write_bytes)
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetCounters {
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

impl NetCounters {
    pub fn total(&self) -> u64 {
        self.received_bytes.saturating_add(self.transmitted_bytes)
    }
}

/// Everything system-wide read in one pass of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemCounters {
    pub captured_at: Instant,
    pub cpu_total: f64,
    pub cpu_per_core: Vec<f64>,
    pub memory: MemoryUsage,
    pub swap: SwapUsage,
    pub partitions: Vec<PartitionUsage>,
    /// `None` where the platform exposes no system-wide disk counters.
    pub disk_io: Option<IoCounters>,
    pub network_io: NetCounters,
    pub host: HostInfo,
}

/// Raw reading of one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessProbe {
    pub pid: u32,
    pub captured_at: Instant,
    pub name: String,
    pub status: ProcessStatus,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_percent: f64,
    pub user: FieldRead<String>,
    pub io: FieldRead<IoCounters>,
    pub network: FieldRead<NetCounters>,
    pub connections: FieldRead<u32>,
    pub start_time: FieldRead<u64>,
    pub cwd: FieldRead<PathBuf>,
    pub cmdline: FieldRead<Vec<String>>,
}

impl ProcessProbe {
    pub fn new(
        pid: u32,
        name: impl Into<String>,
        status: ProcessStatus,
        cpu_percent: f64,
        memory_bytes: u64,
        memory_percent: f64,
    ) -> Self {
        Self {
            pid,
            captured_at: Instant::now(),
            name: name.into(),
            status,
            cpu_percent,
            memory_bytes,
            memory_percent,
            user: Err(FieldError::NotRequested),
            io: Err(FieldError::NotRequested),
            network: Err(FieldError::NotRequested),
            connections: Err(FieldError::NotRequested),
            start_time: Err(FieldError::NotRequested),
            cwd: Err(FieldError::NotRequested),
            cmdline: Err(FieldError::NotRequested),
        }
    }

    pub fn captured_at(mut self, at: Instant) -> Self {
        self.captured_at = at;
        self
    }

    pub fn with_user(mut self, user: FieldRead<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_io(mut self, io: FieldRead<IoCounters>) -> Self {
        self.io = io;
        self
    }

    pub fn with_network(mut self, network: FieldRead<NetCounters>) -> Self {
        self.network = network;
        self
    }

    pub fn with_connections(mut self, connections: FieldRead<u32>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_start_time(mut self, start_time: FieldRead<u64>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_cwd(mut self, cwd: FieldRead<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_cmdline(mut self, cmdline: FieldRead<Vec<String>>) -> Self {
        self.cmdline = cmdline;
        self
    }

    /// Replaces every attribute not asked for in `fields` with
    /// `NotRequested`.
    pub fn mask(mut self, fields: &ProcessFields) -> Self {
        if !fields.user {
            self.user = Err(FieldError::NotRequested);
        }
        if !fields.io {
            self.io = Err(FieldError::NotRequested);
        }
        if !fields.network {
            self.network = Err(FieldError::NotRequested);
        }
        if !fields.connections {
            self.connections = Err(FieldError::NotRequested);
        }
        if !fields.start_time {
            self.start_time = Err(FieldError::NotRequested);
        }
        if !fields.cwd {
            self.cwd = Err(FieldError::NotRequested);
        }
        if !fields.cmdline {
            self.cmdline = Err(FieldError::NotRequested);
        }
        self
    }
}
