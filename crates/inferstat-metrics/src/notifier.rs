//! Completion notifiers handed to the servable lifecycle event source.
//!
//! The event source invokes a notifier with the states its watched
//! servables reached. Only the terminal `End` state marks a finished
//! request; every other state is ignored without side effect.

use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use inferstat_core::{RawMetric, ServableStates};

use crate::aggregator::Aggregator;

/// Callback registered with the lifecycle event source.
///
/// Invoked as `(reached, states)`. May be called more than once and from
/// any thread.
pub type NotifierFn = Arc<dyn Fn(bool, &ServableStates) + Send + Sync>;

/// Builds notifiers bound to one aggregator.
#[derive(Clone)]
pub struct NotifierFactory {
    aggregator: Arc<Aggregator>,
}

impl NotifierFactory {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    /// Notifier for a request that started at `started_at` and finished
    /// with `result`, served by `model_name` at `model_version`.
    pub fn create<T, E>(
        &self,
        started_at: Instant,
        result: &Result<T, E>,
        model_name: &str,
        model_version: i64,
    ) -> NotifierFn {
        self.create_with_outcome(started_at, result.is_ok(), model_name, model_version)
    }

    /// Like [`create`](Self::create), for callers that only kept the outcome.
    pub fn create_with_outcome(
        &self,
        started_at: Instant,
        succeeded: bool,
        model_name: &str,
        model_version: i64,
    ) -> NotifierFn {
        let aggregator = Arc::clone(&self.aggregator);
        let model_name = model_name.to_string();

        Arc::new(move |reached: bool, states: &ServableStates| {
            for (id, state) in states {
                if !state.is_terminal() {
                    trace!(servable = %id, ?state, "ignoring non-terminal state");
                    continue;
                }
                let elapsed_time_ms = elapsed_ms(started_at);
                trace!(servable = %id, reached, elapsed_time_ms, "request completed");
                aggregator.record_raw(RawMetric {
                    metric_name: id.name.clone(),
                    metric_version: id.version,
                    model_name: model_name.clone(),
                    model_version,
                    elapsed_time_ms,
                    succeeded,
                });
            }
        })
    }
}

/// Whole milliseconds since `started_at`, saturating.
fn elapsed_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use inferstat_core::{
        ManagerState, MetricRecord, MetricsConfig, ServableId, RAW_METRIC_NAME,
    };
    use std::time::Duration;

    fn factory(summary: bool) -> (Arc<MemorySink>, Arc<Aggregator>, NotifierFactory) {
        let sink = Arc::new(MemorySink::new());
        let config = MetricsConfig {
            enable_summary: summary,
            ..MetricsConfig::default()
        };
        let aggregator = Arc::new(Aggregator::new(sink.clone(), &config));
        let factory = NotifierFactory::new(aggregator.clone());
        (sink, aggregator, factory)
    }

    fn states(entries: &[(i64, ManagerState)]) -> ServableStates {
        entries
            .iter()
            .map(|&(version, state)| (ServableId::new(RAW_METRIC_NAME, version), state))
            .collect()
    }

    #[test]
    fn end_state_records_raw_metric() {
        let (sink, _, factory) = factory(false);
        let started_at = Instant::now() - Duration::from_millis(25);
        let notifier = factory.create(started_at, &Ok::<(), ()>(()), "inception", 3);

        notifier(true, &states(&[(7, ManagerState::End)]));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let MetricRecord::Raw(raw) = &records[0] else {
            panic!("expected raw record, got {:?}", records[0]);
        };
        assert_eq!(raw.metric_name, RAW_METRIC_NAME);
        assert_eq!(raw.metric_version, 7);
        assert_eq!(raw.model_name, "inception");
        assert_eq!(raw.model_version, 3);
        assert!(raw.succeeded);
        assert!(raw.elapsed_time_ms >= 25, "elapsed {}", raw.elapsed_time_ms);
    }

    #[test]
    fn failed_result_marks_failure() {
        let (sink, _, factory) = factory(false);
        let result: Result<(), &str> = Err("model not found");
        let notifier = factory.create(Instant::now(), &result, "resnet", 1);

        notifier(true, &states(&[(1, ManagerState::End)]));

        match &sink.records()[0] {
            MetricRecord::Raw(raw) => assert!(!raw.succeeded),
            other => panic!("expected raw record, got {other:?}"),
        }
    }

    #[test]
    fn non_terminal_states_ignored() {
        let (sink, aggregator, factory) = factory(true);
        let notifier = factory.create_with_outcome(Instant::now(), true, "inception", 1);

        notifier(
            true,
            &states(&[
                (1, ManagerState::Start),
                (2, ManagerState::Loading),
                (3, ManagerState::Available),
                (4, ManagerState::Unloading),
            ]),
        );

        assert!(sink.is_empty());
        assert_eq!(aggregator.pending(), 0);
    }

    #[test]
    fn only_terminal_entries_of_mixed_batch_recorded() {
        let (_, aggregator, factory) = factory(true);
        let notifier = factory.create_with_outcome(Instant::now(), true, "inception", 1);

        notifier(
            true,
            &states(&[
                (1, ManagerState::Loading),
                (2, ManagerState::End),
                (3, ManagerState::End),
            ]),
        );

        assert_eq!(aggregator.pending(), 2);
    }

    #[test]
    fn repeated_invocations_are_independent() {
        let (_, aggregator, factory) = factory(true);
        let notifier = factory.create_with_outcome(Instant::now(), true, "inception", 1);

        notifier(true, &states(&[(1, ManagerState::End)]));
        notifier(true, &states(&[(2, ManagerState::End)]));
        notifier(false, &states(&[(3, ManagerState::End)]));

        let summaries = aggregator.summarize_and_drain();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].sample_count, 3);
    }

    #[test]
    fn notifier_is_callable_across_threads() {
        let (_, aggregator, factory) = factory(true);
        let notifier = factory.create_with_outcome(Instant::now(), true, "inception", 1);

        std::thread::scope(|s| {
            for version in 0..16 {
                let notifier = Arc::clone(&notifier);
                s.spawn(move || notifier(true, &states(&[(version, ManagerState::End)])));
            }
        });

        assert_eq!(aggregator.pending(), 16);
    }
}
