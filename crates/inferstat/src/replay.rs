//! Replay completed requests through a metrics manager.

use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};

use inferstat_core::{ManagerState, ServableStates};
use inferstat_metrics::MetricsManager;

/// One line of the replay log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletedRequest {
    pub model_name: String,
    #[serde(default)]
    pub model_version: i64,
    pub elapsed_ms: u64,
    #[serde(default = "default_succeeded")]
    pub succeeded: bool,
}

fn default_succeeded() -> bool {
    true
}

pub fn read_events(path: &Path) -> anyhow::Result<Vec<CompletedRequest>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("open events file {}", path.display()))?;
    parse_events(std::io::BufReader::new(file))
}

/// Parse JSON lines, skipping blanks and `#` comments.
pub fn parse_events(reader: impl BufRead) -> anyhow::Result<Vec<CompletedRequest>> {
    let mut requests = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let request: CompletedRequest = serde_json::from_str(line)
            .with_context(|| format!("invalid event on line {}", i + 1))?;
        requests.push(request);
    }
    Ok(requests)
}

/// Deliver one `End` event per request, then shut the manager down.
///
/// When summarizing, waits out one full window first so the replayed
/// requests are published. Returns the number of requests delivered.
pub async fn replay(manager: MetricsManager, requests: &[CompletedRequest]) -> usize {
    let factory = manager.notifier_factory();
    for request in requests {
        let started_at = Instant::now()
            .checked_sub(Duration::from_millis(request.elapsed_ms))
            .unwrap_or_else(Instant::now);
        let notifier = factory.create_with_outcome(
            started_at,
            request.succeeded,
            &request.model_name,
            request.model_version,
        );

        let id = manager.next_metric_id();
        debug!(servable = %id, model = %request.model_name, "replaying request");
        let mut states = ServableStates::new();
        states.insert(id, ManagerState::End);
        notifier(true, &states);
    }

    if manager.config().enable_summary {
        let window = Duration::from_secs(u64::from(manager.config().window_seconds));
        info!(window_secs = window.as_secs(), "waiting for summary window");
        tokio::time::sleep(window + Duration::from_millis(250)).await;
    }

    manager.shutdown().await;
    requests.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use inferstat_core::{MetricRecord, MetricsConfig};
    use inferstat_metrics::MemorySink;

    const EVENTS: &str = r#"
# model, version, latency, outcome
{"model_name": "inception", "model_version": 1, "elapsed_ms": 10, "succeeded": true}
{"model_name": "inception", "model_version": 1, "elapsed_ms": 20}

{"model_name": "resnet", "elapsed_ms": 5, "succeeded": false}
"#;

    #[test]
    fn parse_skips_blanks_and_comments() {
        let requests = parse_events(EVENTS.as_bytes()).unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].succeeded);
        assert_eq!(requests[2].model_version, 0);
        assert!(!requests[2].succeeded);
    }

    #[test]
    fn parse_reports_line_number() {
        let err = parse_events("{\"model_name\": \"a\", \"elapsed_ms\": 1}\nnot json\n".as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn read_events_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EVENTS.as_bytes()).unwrap();
        assert_eq!(read_events(file.path()).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn replay_publishes_raw_metrics() {
        let sink = Arc::new(MemorySink::new());
        let manager = MetricsManager::with_sink(sink.clone(), MetricsConfig::default()).unwrap();
        let requests = parse_events(EVENTS.as_bytes()).unwrap();

        assert_eq!(replay(manager, &requests).await, 3);

        let records = sink.records();
        assert_eq!(records.len(), 3);
        let MetricRecord::Raw(first) = &records[0] else {
            panic!("expected raw record, got {:?}", records[0]);
        };
        assert_eq!(first.model_name, "inception");
        assert_eq!(first.metric_version, 0);
        assert!(first.elapsed_time_ms >= 10);
    }

    #[tokio::test]
    async fn replay_waits_for_summary_window() {
        let sink = Arc::new(MemorySink::new());
        let config = MetricsConfig {
            enable_summary: true,
            window_seconds: 1,
            ..MetricsConfig::default()
        };
        let manager = MetricsManager::with_sink(sink.clone(), config).unwrap();
        let requests = parse_events(EVENTS.as_bytes()).unwrap();

        replay(manager, &requests).await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| matches!(r, MetricRecord::Summary(_))));
    }
}
