//! metrics.toml configuration parser.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::DEFAULT_WINDOW_SECONDS;

/// Destination for published metric records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SinkKind {
    /// The process's structured log output.
    #[default]
    Log,
    /// The system logger (syslog).
    Syslog,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Log => "logger",
            SinkKind::Syslog => "syslog",
        }
    }
}

impl FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logger" | "log" => Ok(SinkKind::Log),
            "syslog" => Ok(SinkKind::Syslog),
            _ => Err(ConfigError::UnknownSink(s.to_string())),
        }
    }
}

impl TryFrom<String> for SinkKind {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SinkKind> for String {
    fn from(kind: SinkKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a group's average latency is folded as samples arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AveragePolicy {
    /// `(previous_average + sample) / sample_count`, as historically emitted
    /// by the serving front end. Not a true mean past two samples.
    #[default]
    Legacy,
    /// `total / sample_count`.
    Arithmetic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub sink: SinkKind,
    pub enable_summary: bool,
    pub window_seconds: u32,
    /// Also publish every raw record while summarizing.
    pub publish_raw: bool,
    pub averaging: AveragePolicy,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            enable_summary: false,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            publish_raw: false,
            averaging: AveragePolicy::Legacy,
        }
    }
}

impl MetricsConfig {
    /// Build a config from the three knobs the serving front end exposes.
    pub fn new(sink: &str, enable_summary: bool, window_seconds: u32) -> Result<Self, ConfigError> {
        let config = Self {
            sink: sink.parse()?,
            enable_summary,
            window_seconds,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MetricsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// A zero-length window would spin the publisher task.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_summary && self.window_seconds == 0 {
            return Err(ConfigError::InvalidWindow(self.window_seconds));
        }
        Ok(())
    }
}
