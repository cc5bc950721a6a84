use crate::error::{Error, Result};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::monitoring::ProcessFields;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "hostpulse.toml";
const DEFAULT_CONFIG_SECTION: &str = "hostpulse";
const DEFAULT_SETTINGS_PATH: &str = "hostpulse-settings.json";

pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Whether an optional source (battery, temperature) is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Probe once at startup and keep the result for the run.
    #[default]
    Auto,
    On,
    Off,
}

impl FromStr for SourceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "on" | "true" | "1" => Ok(Self::On),
            "off" | "false" | "0" => Ok(Self::Off),
            other => Err(Error::Configuration(format!(
                "unknown source mode '{other}', expected auto, on or off"
            ))),
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::On => "on",
            Self::Off => "off",
        };
        f.write_str(s)
    }
}

/// Configuration fields that can be loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorFileConfig {
    pub log_level: Option<String>,
    pub tick_interval_ms: Option<u64>,
    pub process_tick_interval_ms: Option<u64>,
    pub history_capacity: Option<usize>,
    pub battery: Option<SourceMode>,
    pub temperature: Option<SourceMode>,
    pub event_capacity: Option<usize>,
    pub settings_path: Option<PathBuf>,
    pub full_process_details: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub log_level: String,
    pub tick_interval_ms: u64,
    pub process_tick_interval_ms: u64,
    pub history_capacity: usize,
    pub battery: SourceMode,
    pub temperature: SourceMode,
    pub event_capacity: usize,
    pub settings_path: PathBuf,
    pub full_process_details: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            tick_interval_ms: 1000,
            process_tick_interval_ms: 1000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            battery: SourceMode::Auto,
            temperature: SourceMode::Auto,
            event_capacity: 64,
            settings_path: PathBuf::from(DEFAULT_SETTINGS_PATH),
            full_process_details: true,
        }
    }
}

impl MonitorConfig {
    /// Defaults, then the TOML file if present, then `HOSTPULSE_*` variables.
    /// The result is validated.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let config_path =
            env::var("HOSTPULSE_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&config_path).exists() {
            let section = env::var("HOSTPULSE_CONFIG_SECTION")
                .unwrap_or_else(|_| DEFAULT_CONFIG_SECTION.to_string());
            let file_config = Self::from_file(&config_path, &section)?;
            config.apply_file(file_config);
        }

        config.apply_env_from(|key| env::var(key).ok())?;
        config.validate()
    }

    pub fn from_file<P: AsRef<Path>>(path: P, section: &str) -> Result<MonitorFileConfig> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let config: HashMap<String, toml::Value> = toml::from_str(&contents)?;

        let section_value = config.get(section).ok_or_else(|| {
            Error::Configuration(format!(
                "config section '{section}' not found in {}",
                path.display()
            ))
        })?;

        section_value.clone().try_into().map_err(|e| {
            Error::Configuration(format!("failed to parse config section '{section}': {e}"))
        })
    }

    pub fn apply_file(&mut self, file: MonitorFileConfig) {
        if let Some(val) = file.log_level.filter(|v| !v.is_empty()) {
            self.log_level = val;
        }
        if let Some(val) = file.tick_interval_ms {
            self.tick_interval_ms = val;
        }
        if let Some(val) = file.process_tick_interval_ms {
            self.process_tick_interval_ms = val;
        }
        if let Some(val) = file.history_capacity {
            self.history_capacity = val;
        }
        if let Some(val) = file.battery {
            self.battery = val;
        }
        if let Some(val) = file.temperature {
            self.temperature = val;
        }
        if let Some(val) = file.event_capacity {
            self.event_capacity = val;
        }
        if let Some(val) = file.settings_path {
            self.settings_path = val;
        }
        if let Some(val) = file.full_process_details {
            self.full_process_details = val;
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_from(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from `lookup`, which maps a `HOSTPULSE_*` name to
    /// its value. Unparseable numbers are ignored; unknown source modes are
    /// an error.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("HOSTPULSE_LOG_LEVEL") {
            if !val.is_empty() {
                self.log_level = val;
            }
        }

        if let Some(val) = lookup("HOSTPULSE_TICK_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                self.tick_interval_ms = interval;
            }
        }

        if let Some(val) = lookup("HOSTPULSE_PROCESS_TICK_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                self.process_tick_interval_ms = interval;
            }
        }

        if let Some(val) = lookup("HOSTPULSE_HISTORY_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.history_capacity = capacity;
            }
        }

        if let Some(val) = lookup("HOSTPULSE_EVENT_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.event_capacity = capacity;
            }
        }

        if let Some(val) = lookup("HOSTPULSE_BATTERY") {
            self.battery = val.parse()?;
        }

        if let Some(val) = lookup("HOSTPULSE_TEMPERATURE") {
            self.temperature = val.parse()?;
        }

        if let Some(val) = lookup("HOSTPULSE_SETTINGS_PATH") {
            if !val.is_empty() {
                self.settings_path = PathBuf::from(val);
            }
        }

        if let Some(val) = lookup("HOSTPULSE_FULL_PROCESS_DETAILS") {
            self.full_process_details = val.to_lowercase() == "true" || val == "1";
        }

        Ok(())
    }

    /// Rejects values no loop can run with and raises intervals below
    /// `MIN_TICK_INTERVAL_MS` to that floor.
    pub fn validate(mut self) -> Result<Self> {
        self.tick_interval_ms = clamp_interval("tick_interval_ms", self.tick_interval_ms)?;
        self.process_tick_interval_ms =
            clamp_interval("process_tick_interval_ms", self.process_tick_interval_ms)?;

        if self.history_capacity == 0 {
            return Err(Error::Configuration(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Configuration(
                "event_capacity must be at least 1".to_string(),
            ));
        }

        Ok(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn process_tick_interval(&self) -> Duration {
        Duration::from_millis(self.process_tick_interval_ms)
    }

    pub fn process_fields(&self) -> ProcessFields {
        if self.full_process_details {
            ProcessFields::all()
        } else {
            ProcessFields::minimal()
        }
    }
}

fn clamp_interval(name: &str, value: u64) -> Result<u64> {
    match value {
        0 => Err(Error::Configuration(format!(
            "{name} must be greater than zero"
        ))),
        v if v < MIN_TICK_INTERVAL_MS => {
            warn!(
                "{} of {}ms is below the {}ms minimum, using {}ms",
                name, v, MIN_TICK_INTERVAL_MS, MIN_TICK_INTERVAL_MS
            );
            Ok(MIN_TICK_INTERVAL_MS)
        }
        v => Ok(v),
    }
}
