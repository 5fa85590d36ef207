//! Periodic summary publisher — background task draining the aggregator.
//!
//! Sleeps for one window, drains the aggregator, publishes every summary,
//! and repeats until told to stop. Stopping is cooperative: a cycle already
//! publishing when the signal arrives completes, and no further cycle starts.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use inferstat_core::ConfigError;

use crate::aggregator::Aggregator;

/// Lifecycle of a [`PublisherTask`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Created,
            1 => TaskState::Running,
            2 => TaskState::Stopping,
            _ => TaskState::Stopped,
        }
    }
}

/// Handle to the background summary loop.
pub struct PublisherTask {
    state: Arc<AtomicU8>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PublisherTask {
    /// Start publishing `aggregator`'s summaries every `period` on the
    /// current tokio runtime.
    pub fn spawn(aggregator: Arc<Aggregator>, period: Duration) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(AtomicU8::new(TaskState::Created as u8));

        state.store(TaskState::Running as u8, Ordering::Release);
        let handle = runtime.spawn(run_publish_loop(
            aggregator,
            period,
            shutdown_rx,
            Arc::clone(&state),
        ));

        Ok(Self {
            state,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Signal the loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        let signalled = self
            .state
            .compare_exchange(
                TaskState::Running as u8,
                TaskState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if signalled {
            self.shutdown_tx.send_replace(true);
            debug!("summary publisher stop requested");
        }
    }

    /// Wait for the loop to exit. Returns immediately if already joined.
    pub async fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "summary publisher task failed");
            }
            self.state.store(TaskState::Stopped as u8, Ordering::Release);
        }
    }
}

impl Drop for PublisherTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The summary loop. Exits when the stop signal fires or its sender is gone.
async fn run_publish_loop(
    aggregator: Arc<Aggregator>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    state: Arc<AtomicU8>,
) {
    info!(window_secs = period.as_secs_f64(), "summary publisher started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                break;
            }
            _ = tokio::time::sleep(period) => {
                let published = aggregator.publish_window();
                debug!(published, "summary window published");
            }
        }
    }

    state.store(TaskState::Stopped as u8, Ordering::Release);
    info!("summary publisher stopped");
}
