use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sampler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Why a single optional attribute of a subject could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("not supported on this platform")]
    Unsupported,

    #[error("not requested")]
    NotRequested,
}

/// Failure to read the mandatory part of a process record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("access denied to process {0}")]
    AccessDenied(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no such process: {0}")]
    NoSuchProcess(u32),

    #[error("access denied to process {0}")]
    AccessDenied(u32),

    #[error("invalid priority {0}, expected -20..=19")]
    InvalidPriority(i32),

    #[error("process control is not supported on this platform")]
    Unsupported,

    #[error("OS error {errno} for process {pid}")]
    Os { pid: u32, errno: i32 },
}
