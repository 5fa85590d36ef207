//! Metric records and lifecycle vocabulary.
//!
//! A [`RawMetric`] is one completed inference request. A [`SummaryMetric`]
//! folds every raw metric sharing a [`GroupKey`] within one window.
//! [`MetricRecord`] is the closed set of things a sink can publish.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metric name stamped on every raw per-request observation.
pub const RAW_METRIC_NAME: &str = "PredictMetric";

/// Metric name stamped on every per-window summary.
pub const SUMMARY_METRIC_NAME: &str = "PredictSummary";

/// Summarization interval used when none is configured.
pub const DEFAULT_WINDOW_SECONDS: u32 = 30;

// ── Lifecycle ──────────────────────────────────────────────────────

/// Identity of a servable: a `(name, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServableId {
    pub name: String,
    pub version: i64,
}

impl ServableId {
    pub fn new(name: impl Into<String>, version: i64) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ServableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{name: {} version: {}}}", self.name, self.version)
    }
}

/// Lifecycle state reported by the event source for a servable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Start,
    Loading,
    Available,
    Unloading,
    /// Terminal state. The only one that produces a metric.
    End,
}

impl ManagerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManagerState::End)
    }
}

/// States reached by servables, as delivered to a notifier.
pub type ServableStates = BTreeMap<ServableId, ManagerState>;

// ── Records ────────────────────────────────────────────────────────

/// One observation of a completed inference request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetric {
    pub metric_name: String,
    pub metric_version: i64,
    pub model_name: String,
    pub model_version: i64,
    pub elapsed_time_ms: u64,
    pub succeeded: bool,
}

impl RawMetric {
    /// The identity this observation was reported under.
    pub fn servable_id(&self) -> ServableId {
        ServableId::new(self.metric_name.clone(), self.metric_version)
    }

    /// The summary group this observation folds into.
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            model_name: self.model_name.clone(),
            model_version: self.model_version,
            succeeded: self.succeeded,
        }
    }
}

/// Grouping key for summaries: model identity plus outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub model_name: String,
    pub model_version: i64,
    pub succeeded: bool,
}

/// Aggregate over all raw metrics of one [`GroupKey`] in one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMetric {
    pub metric_name: String,
    pub model_name: String,
    pub model_version: i64,
    pub succeeded: bool,
    pub sample_count: u64,
    pub average_elapsed_time_ms: u64,
    pub window_seconds: u32,
}

impl SummaryMetric {
    /// Summary seeded from the first raw metric seen for its group.
    pub fn first(raw: &RawMetric, window_seconds: u32) -> Self {
        Self {
            metric_name: SUMMARY_METRIC_NAME.to_string(),
            model_name: raw.model_name.clone(),
            model_version: raw.model_version,
            succeeded: raw.succeeded,
            sample_count: 1,
            average_elapsed_time_ms: raw.elapsed_time_ms,
            window_seconds,
        }
    }

    /// Summaries always report version 0.
    pub fn metric_version(&self) -> i64 {
        0
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            model_name: self.model_name.clone(),
            model_version: self.model_version,
            succeeded: self.succeeded,
        }
    }
}

/// Everything a sink knows how to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricRecord {
    Raw(RawMetric),
    Summary(SummaryMetric),
}

impl MetricRecord {
    pub fn metric_name(&self) -> &str {
        match self {
            MetricRecord::Raw(m) => &m.metric_name,
            MetricRecord::Summary(m) => &m.metric_name,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            MetricRecord::Raw(m) => &m.model_name,
            MetricRecord::Summary(m) => &m.model_name,
        }
    }

    /// Ordered `(key, value)` fields as they appear on the wire.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            MetricRecord::Raw(m) => vec![
                ("metric_name", m.metric_name.clone()),
                ("metric_version", m.metric_version.to_string()),
                ("model_name", m.model_name.clone()),
                ("model_version", m.model_version.to_string()),
                ("is_success", flag(m.succeeded).to_string()),
                ("predict_time_ms", m.elapsed_time_ms.to_string()),
            ],
            MetricRecord::Summary(m) => vec![
                ("metric_name", m.metric_name.clone()),
                ("prediction_count", m.sample_count.to_string()),
                ("model_name", m.model_name.clone()),
                ("model_version", m.model_version.to_string()),
                ("is_success", flag(m.succeeded).to_string()),
                ("average_predict_time_ms", m.average_elapsed_time_ms.to_string()),
                ("summary_period", m.window_seconds.to_string()),
            ],
        }
    }
}

/// Renders the record as space-separated `key="value"` pairs.
impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}=\"{value}\"")?;
        }
        Ok(())
    }
}

impl From<RawMetric> for MetricRecord {
    fn from(m: RawMetric) -> Self {
        MetricRecord::Raw(m)
    }
}

impl From<SummaryMetric> for MetricRecord {
    fn from(m: SummaryMetric) -> Self {
        MetricRecord::Summary(m)
    }
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}
