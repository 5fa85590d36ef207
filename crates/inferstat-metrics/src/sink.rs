//! Metric sinks — where published records end up.
//!
//! A sink publishes one [`MetricRecord`] at a time. Failures are reported
//! to the caller as `PublishError` and are never fatal: the engine logs
//! them and keeps aggregating.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use inferstat_core::{ConfigError, MetricRecord, PublishResult, SinkKind};

/// Log target used by [`LogSink`].
pub const LOG_TARGET: &str = "inferstat::metrics";

/// Destination for metric records.
pub trait MetricSink: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Publish a single record. Must not block indefinitely.
    fn publish(&self, record: &MetricRecord) -> PublishResult<()>;
}

/// Build the sink for a configured kind.
pub fn build_sink(kind: SinkKind) -> Result<Arc<dyn MetricSink>, ConfigError> {
    match kind {
        SinkKind::Log => Ok(Arc::new(LogSink)),
        #[cfg(unix)]
        SinkKind::Syslog => Ok(Arc::new(SyslogSink::open())),
        #[cfg(not(unix))]
        SinkKind::Syslog => Err(ConfigError::Unsupported("syslog")),
    }
}

/// Publish a record, logging (not propagating) any failure.
///
/// Returns whether the record was accepted by the sink.
pub fn publish_logged(sink: &dyn MetricSink, record: &MetricRecord) -> bool {
    match sink.publish(record) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                sink = sink.name(),
                metric = record.metric_name(),
                model = record.model_name(),
                error = %e,
                "failed to publish metric"
            );
            false
        }
    }
}

// ── Log stream ─────────────────────────────────────────────────────

/// Writes each record as a `key="value"` line to the tracing output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn publish(&self, record: &MetricRecord) -> PublishResult<()> {
        info!(target: LOG_TARGET, "{record}");
        Ok(())
    }
}

// ── Syslog ─────────────────────────────────────────────────────────

#[cfg(unix)]
pub use syslog::SyslogSink;

#[cfg(unix)]
mod syslog {
    use std::ffi::{CStr, CString};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, PoisonError};

    use tracing::debug;

    use super::MetricSink;
    use inferstat_core::{MetricRecord, PublishError, PublishResult};

    /// Application tag every syslog line is filed under.
    const IDENT: &CStr = c"inferstat";

    /// `openlog`/`closelog` act on process-wide state; count live sinks so
    /// the channel is released only when the last one goes away.
    static OPEN_SINKS: Mutex<usize> = Mutex::new(0);

    /// Writes each record as one `LOG_INFO` line to the system logger.
    ///
    /// The logging channel is opened on construction and released by
    /// [`SyslogSink::close`] or on drop, whichever happens first.
    #[derive(Debug)]
    pub struct SyslogSink {
        closed: AtomicBool,
    }

    impl SyslogSink {
        pub fn open() -> Self {
            let mut open = OPEN_SINKS.lock().unwrap_or_else(PoisonError::into_inner);
            if *open == 0 {
                // SAFETY: IDENT is a 'static NUL-terminated string, so the
                // pointer openlog retains stays valid for the process lifetime.
                unsafe {
                    libc::openlog(IDENT.as_ptr(), libc::LOG_PID | libc::LOG_CONS, libc::LOG_USER);
                }
                debug!("syslog channel opened");
            }
            *open += 1;
            Self {
                closed: AtomicBool::new(false),
            }
        }

        /// Release this sink's hold on the syslog channel. Idempotent.
        pub fn close(&self) {
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            let mut open = OPEN_SINKS.lock().unwrap_or_else(PoisonError::into_inner);
            *open = open.saturating_sub(1);
            if *open == 0 {
                // SAFETY: closelog has no preconditions.
                unsafe { libc::closelog() };
                debug!("syslog channel closed");
            }
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }

    impl MetricSink for SyslogSink {
        fn name(&self) -> &'static str {
            "syslog"
        }

        fn publish(&self, record: &MetricRecord) -> PublishResult<()> {
            if self.is_closed() {
                return Err(PublishError::Closed);
            }
            let line = CString::new(record.to_string())
                .map_err(|e| PublishError::InvalidRecord(e.to_string()))?;
            // SAFETY: both pointers are valid NUL-terminated strings and the
            // "%s" format consumes exactly one string argument.
            unsafe {
                libc::syslog(libc::LOG_INFO, c"%s".as_ptr(), line.as_ptr());
            }
            Ok(())
        }
    }

    impl Drop for SyslogSink {
        fn drop(&mut self) {
            self.close();
        }
    }
}

// ── In-memory ──────────────────────────────────────────────────────

/// Keeps every published record in memory. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<MetricRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, in publish order.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything published so far.
    pub fn take(&self) -> Vec<MetricRecord> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl MetricSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn publish(&self, record: &MetricRecord) -> PublishResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferstat_core::{PublishError, RawMetric, SummaryMetric, RAW_METRIC_NAME};

    struct FailingSink;

    impl MetricSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn publish(&self, _record: &MetricRecord) -> PublishResult<()> {
            Err(PublishError::Io(std::io::Error::other("disk full")))
        }
    }

    fn raw() -> RawMetric {
        RawMetric {
            metric_name: RAW_METRIC_NAME.to_string(),
            metric_version: 7,
            model_name: "inception".to_string(),
            model_version: 1,
            elapsed_time_ms: 10,
            succeeded: true,
        }
    }

    fn raw_record() -> MetricRecord {
        MetricRecord::Raw(raw())
    }

    #[test]
    fn memory_sink_keeps_publish_order() {
        let sink = MemorySink::new();
        let raw = raw_record();
        let summary = MetricRecord::Summary(SummaryMetric::first(&self::raw(), 30));

        sink.publish(&raw).unwrap();
        sink.publish(&summary).unwrap();

        assert_eq!(sink.records(), vec![raw, summary]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn log_sink_always_accepts() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        assert!(LogSink.publish(&raw_record()).is_ok());
    }

    #[test]
    fn publish_logged_swallows_failures() {
        assert!(!publish_logged(&FailingSink, &raw_record()));
        assert!(publish_logged(&LogSink, &raw_record()));
    }

    #[test]
    fn build_log_sink() {
        let sink = build_sink(SinkKind::Log).unwrap();
        assert_eq!(sink.name(), "logger");
    }

    #[cfg(unix)]
    #[test]
    fn syslog_sink_lifecycle() {
        let sink = SyslogSink::open();
        assert!(sink.publish(&raw_record()).is_ok());

        sink.close();
        sink.close();
        assert!(sink.is_closed());
        assert!(matches!(sink.publish(&raw_record()), Err(PublishError::Closed)));
    }

    #[cfg(unix)]
    #[test]
    fn syslog_rejects_interior_nul() {
        let sink = SyslogSink::open();
        let mut record = raw_record();
        if let MetricRecord::Raw(ref mut r) = record {
            r.model_name = "bad\0name".to_string();
        }
        assert!(matches!(sink.publish(&record), Err(PublishError::InvalidRecord(_))));
    }

    #[cfg(unix)]
    #[test]
    fn build_syslog_sink() {
        let sink = build_sink(SinkKind::Syslog).unwrap();
        assert_eq!(sink.name(), "syslog");
    }
}
