//! Metrics manager — wires a sink, an aggregator, and the summary publisher.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use inferstat_core::{ConfigError, MetricsConfig, ServableId, RAW_METRIC_NAME};

use crate::aggregator::Aggregator;
use crate::notifier::{NotifierFactory, NotifierFn};
use crate::publisher::{PublisherTask, TaskState};
use crate::sink::{build_sink, MetricSink};

/// Owns the metrics pipeline for one serving process.
///
/// With summarization enabled the manager must be created inside a tokio
/// runtime, which hosts the publisher task. Call [`stop`](Self::stop) or
/// [`shutdown`](Self::shutdown) before assuming no background work remains.
pub struct MetricsManager {
    config: MetricsConfig,
    aggregator: Arc<Aggregator>,
    notifiers: NotifierFactory,
    publisher: Option<PublisherTask>,
    /// Version handed out by [`next_metric_id`](Self::next_metric_id).
    sequence: AtomicI64,
}

impl MetricsManager {
    /// Build a manager from a sink name, e.g. `"logger"` or `"syslog"`.
    pub fn create(sink: &str, enable_summary: bool, window_seconds: u32) -> Result<Self, ConfigError> {
        Self::from_config(MetricsConfig::new(sink, enable_summary, window_seconds)?)
    }

    pub fn from_config(config: MetricsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink = build_sink(config.sink)?;
        Self::with_sink(sink, config)
    }

    /// Build a manager around an already constructed sink. `config.sink`
    /// is ignored.
    pub fn with_sink(sink: Arc<dyn MetricSink>, config: MetricsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink_name = sink.name();
        let aggregator = Arc::new(Aggregator::new(sink, &config));

        let publisher = if config.enable_summary {
            let period = Duration::from_secs(u64::from(config.window_seconds));
            Some(PublisherTask::spawn(Arc::clone(&aggregator), period)?)
        } else {
            None
        };

        info!(
            sink = sink_name,
            summary = config.enable_summary,
            window_secs = config.window_seconds,
            "metrics manager created"
        );

        Ok(Self {
            notifiers: NotifierFactory::new(Arc::clone(&aggregator)),
            config,
            aggregator,
            publisher,
            sequence: AtomicI64::new(0),
        })
    }

    /// Notifier to register with the lifecycle event source for one request.
    pub fn create_notifier<T, E>(
        &self,
        started_at: Instant,
        result: &Result<T, E>,
        model_name: &str,
        model_version: i64,
    ) -> NotifierFn {
        self.notifiers.create(started_at, result, model_name, model_version)
    }

    pub fn notifier_factory(&self) -> &NotifierFactory {
        &self.notifiers
    }

    /// Fresh `PredictMetric` identity for the next request's lifecycle event.
    pub fn next_metric_id(&self) -> ServableId {
        ServableId::new(RAW_METRIC_NAME, self.sequence.fetch_add(1, Ordering::Relaxed))
    }

    /// Signal the publisher task to stop. Idempotent; a no-op when
    /// summarization is disabled.
    pub fn stop(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.stop();
        }
    }

    /// Stop the publisher task and wait for it to exit.
    pub async fn shutdown(self) {
        if let Some(publisher) = &self.publisher {
            publisher.stop();
            publisher.join().await;
        }
        info!("metrics manager stopped");
    }

    /// State of the publisher task, or `None` when summarization is off.
    pub fn publisher_state(&self) -> Option<TaskState> {
        self.publisher.as_ref().map(PublisherTask::state)
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }
}
