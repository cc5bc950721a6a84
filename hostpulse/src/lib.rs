// Copyright (c) Abstract Machines

//! Hostpulse - host metric sampling engine
//!
//! Two periodic samplers read host and per-process counters through a
//! `MetricsProvider`, turn monotonic counters into per-second rates, keep a
//! fixed-length history for charting and publish immutable snapshots that
//! any number of consumers can read without blocking the samplers.

pub mod bus;
pub mod config;
pub mod control;
pub mod error;
pub mod history;
pub mod monitoring;
pub mod rate;
pub mod sampler;
pub mod service;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use bus::{CollectionEvent, EventSource};
pub use config::{MonitorConfig, SourceMode};
pub use error::{ControlError, Error, Result};
pub use history::HistoryMetric;
pub use monitoring::{MetricsProvider, ProcessFields};
pub use rate::Rate;
pub use service::Monitor;
pub use settings::Settings;
pub use types::{ProcessRecord, ProcessTable, Snapshot};
