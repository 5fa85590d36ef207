//! inferstat-core — shared types for the inferstat metrics pipeline.
//!
//! Holds the metric record model (raw per-request observations and
//! per-window summaries), the servable lifecycle vocabulary the
//! completion notifier listens to, the TOML configuration surface, and
//! the error kinds surfaced by the engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AveragePolicy, MetricsConfig, SinkKind};
pub use error::{ConfigError, PublishError, PublishResult};
pub use types::*;
