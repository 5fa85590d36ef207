//! Aggregator — collects raw metrics and folds them into window summaries.
//!
//! Raw metrics arrive from notifier callbacks on arbitrary threads while the
//! publisher task drains them once per window. A single `std::sync::Mutex`
//! guards the window; it is held only for one insert or one whole-window
//! take, and never across a sink publish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use inferstat_core::{
    AveragePolicy, GroupKey, MetricRecord, MetricsConfig, RawMetric, ServableId, SummaryMetric,
};

use crate::sink::{publish_logged, MetricSink};

/// Raw metrics collected since the last drain, in arrival order.
///
/// Keyed by the servable identity the metric was reported under: a second
/// report for the same identity replaces the first in place.
#[derive(Debug, Default)]
struct Window {
    raw: Vec<RawMetric>,
    index: HashMap<ServableId, usize>,
}

impl Window {
    fn insert(&mut self, raw: RawMetric) {
        let id = raw.servable_id();
        match self.index.get(&id) {
            Some(&slot) => self.raw[slot] = raw,
            None => {
                self.index.insert(id, self.raw.len());
                self.raw.push(raw);
            }
        }
    }
}

/// Owns the current window of raw metrics and the sink they publish to.
pub struct Aggregator {
    window: Mutex<Window>,
    sink: Arc<dyn MetricSink>,
    summarize: bool,
    publish_raw: bool,
    window_seconds: u32,
    averaging: AveragePolicy,
}

impl Aggregator {
    /// Create an aggregator publishing to `sink`.
    pub fn new(sink: Arc<dyn MetricSink>, config: &MetricsConfig) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            sink,
            summarize: config.enable_summary,
            publish_raw: config.publish_raw,
            window_seconds: config.window_seconds,
            averaging: config.averaging,
        }
    }

    /// Record one completed request.
    ///
    /// With summarization disabled the record is published immediately and
    /// nothing is retained. Otherwise it joins the current window (and is
    /// also published when `publish_raw` is set).
    pub fn record_raw(&self, raw: RawMetric) {
        if !self.summarize {
            publish_logged(self.sink.as_ref(), &MetricRecord::Raw(raw));
            return;
        }

        let passthrough = self.publish_raw.then(|| MetricRecord::Raw(raw.clone()));
        self.lock().insert(raw);

        if let Some(record) = passthrough {
            publish_logged(self.sink.as_ref(), &record);
        }
    }

    /// Take everything recorded so far and fold it into one summary per
    /// `(model_name, model_version, succeeded)`.
    ///
    /// The window is swapped out under the lock, so a concurrent
    /// [`record_raw`](Self::record_raw) lands either in this drain or in the
    /// next one, never both.
    pub fn summarize_and_drain(&self) -> Vec<SummaryMetric> {
        let window = std::mem::take(&mut *self.lock());
        let summaries = summarize(&window.raw, self.window_seconds, self.averaging);
        debug!(
            raw = window.raw.len(),
            summaries = summaries.len(),
            "summary window drained"
        );
        summaries
    }

    /// Drain the window and publish every summary. Returns how many the
    /// sink accepted.
    pub fn publish_window(&self) -> usize {
        self.summarize_and_drain()
            .into_iter()
            .map(MetricRecord::Summary)
            .filter(|record| publish_logged(self.sink.as_ref(), record))
            .count()
    }

    /// Number of raw metrics waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.lock().raw.len()
    }

    pub fn is_summarizing(&self) -> bool {
        self.summarize
    }

    pub fn window_seconds(&self) -> u32 {
        self.window_seconds
    }

    pub fn sink(&self) -> &Arc<dyn MetricSink> {
        &self.sink
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        // Every critical section is a single insert or a whole take, so a
        // panic elsewhere cannot leave the window half-updated.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fold raw metrics, in order, into one summary per group.
///
/// Each group's running state depends only on its own entries, so groups
/// may be interleaved freely. The result lists groups in first-seen order.
pub fn summarize(
    raws: &[RawMetric],
    window_seconds: u32,
    averaging: AveragePolicy,
) -> Vec<SummaryMetric> {
    let mut slots: HashMap<GroupKey, usize> = HashMap::new();
    let mut summaries: Vec<SummaryMetric> = Vec::new();
    let mut totals: Vec<u64> = Vec::new();

    for raw in raws {
        let key = raw.group_key();
        let Some(slot) = slots.get(&key).copied() else {
            slots.insert(key, summaries.len());
            summaries.push(SummaryMetric::first(raw, window_seconds));
            totals.push(raw.elapsed_time_ms);
            continue;
        };

        let summary = &mut summaries[slot];
        let total = &mut totals[slot];
        summary.sample_count += 1;
        *total = total.saturating_add(raw.elapsed_time_ms);
        summary.average_elapsed_time_ms = match averaging {
            AveragePolicy::Legacy => {
                summary.average_elapsed_time_ms.saturating_add(raw.elapsed_time_ms)
                    / summary.sample_count
            }
            AveragePolicy::Arithmetic => *total / summary.sample_count,
        };
    }

    summaries
}
