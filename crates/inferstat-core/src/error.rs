//! Error types for the inferstat metrics pipeline.
//!
//! Aggregation itself never fails. Errors come from building a manager
//! ([`ConfigError`]) or from a sink writing a record ([`PublishError`]).

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for sink operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that prevent a metrics manager from being built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown metrics sink: {0}")]
    UnknownSink(String),

    #[error("invalid summary window: {0}s (must be at least 1s)")]
    InvalidWindow(u32),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("summary publishing requires a running tokio runtime")]
    NoRuntime,

    #[error("sink not supported on this platform: {0}")]
    Unsupported(&'static str),
}

/// Errors a sink can report for a single record.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("record cannot be written: {0}")]
    InvalidRecord(String),

    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink is closed")]
    Closed,
}
