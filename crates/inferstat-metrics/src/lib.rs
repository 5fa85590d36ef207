//! inferstat-metrics — per-request inference metrics and windowed summaries.
//!
//! Observes request completions reported by a servable lifecycle event
//! source, records one raw metric per completed request, periodically
//! folds them into per-model summaries, and publishes records to a
//! pluggable sink.
//!
//! # Architecture
//!
//! ```text
//! MetricsManager
//!   ├── NotifierFactory::create() → NotifierFn handed to the event source
//!   │     └── on End state → Aggregator::record_raw()
//!   ├── Aggregator
//!   │   ├── record_raw()          ← notifier threads
//!   │   └── summarize_and_drain() ← publisher task
//!   ├── PublisherTask → sleep(window), drain, publish summaries
//!   └── MetricSink (LogSink | SyslogSink)
//! ```

pub mod aggregator;
pub mod manager;
pub mod notifier;
pub mod publisher;
pub mod sink;

pub use aggregator::{summarize, Aggregator};
pub use manager::MetricsManager;
pub use notifier::{NotifierFactory, NotifierFn};
pub use publisher::{PublisherTask, TaskState};
pub use sink::{LogSink, MemorySink, MetricSink};
#[cfg(unix)]
pub use sink::SyslogSink;
