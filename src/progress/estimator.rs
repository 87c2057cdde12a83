//! Synthesized progress for a long call with no progress callback.
//!
//! The estimate is approximate: a fixed step every fixed interval, with no
//! relation to how fast the model actually runs. It only keeps the progress
//! bar moving and never claims 90% or more.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::reporter::{Phase, ProgressReporter};
use crate::config::EstimatorSettings;

/// Highest percent an estimate may ever claim
const MAX_ESTIMATED_PERCENT: u8 = 89;

/// How long `stop` waits for the ticking task before aborting it
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Background ticker configuration
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    interval: Duration,
    step: u8,
    start_percent: u8,
    ceiling: u8,
}

impl ProgressEstimator {
    pub fn new(interval: Duration, step: u8, start_percent: u8, ceiling: u8) -> Self {
        let ceiling = ceiling.min(MAX_ESTIMATED_PERCENT);
        Self {
            interval,
            step: step.max(1),
            start_percent: start_percent.min(ceiling),
            ceiling,
        }
    }

    pub fn from_settings(settings: &EstimatorSettings) -> Self {
        Self::new(
            settings.interval(),
            settings.step,
            settings.start_percent,
            settings.ceiling,
        )
    }

    /// Start ticking in the background. The returned handle must be stopped
    /// (or dropped) when the tracked call ends.
    pub fn start(&self, reporter: Arc<ProgressReporter>) -> EstimatorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let percent = Arc::new(AtomicU8::new(self.start_percent));

        let task = tokio::spawn(tick(
            self.clone(),
            reporter,
            stop_rx,
            Arc::clone(&percent),
            Instant::now(),
        ));

        EstimatorHandle {
            stop_tx,
            task: Some(task),
            percent,
        }
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::from_settings(&EstimatorSettings::default())
    }
}

async fn tick(
    estimator: ProgressEstimator,
    reporter: Arc<ProgressReporter>,
    mut stop_rx: watch::Receiver<bool>,
    percent: Arc<AtomicU8>,
    started: Instant,
) {
    let mut progress = percent.load(Ordering::Acquire);

    while progress < estimator.ceiling {
        let sender_gone = tokio::select! {
            _ = tokio::time::sleep(estimator.interval) => false,
            changed = stop_rx.changed() => changed.is_err(),
        };

        if sender_gone || *stop_rx.borrow() {
            break;
        }

        progress = progress.saturating_add(estimator.step).min(estimator.ceiling);
        percent.store(progress, Ordering::Release);

        let elapsed = started.elapsed().as_secs_f64();
        reporter.report(
            Phase::Transcribing,
            progress,
            format!("Transcribing audio... ({:.0}s elapsed)", elapsed),
        );
    }

    debug!("Progress estimator finished at {}%", progress);
}

/// Handle to a running estimator
pub struct EstimatorHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    percent: Arc<AtomicU8>,
}

impl EstimatorHandle {
    /// Last percent the estimator reported (or its start percent)
    pub fn current_percent(&self) -> u8 {
        self.percent.load(Ordering::Acquire)
    }

    /// Signal stop and wait, bounded, for the ticking task to end
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(JOIN_TIMEOUT, &mut task).await.is_err() {
                warn!("Progress estimator did not stop within {:?}, aborting it", JOIN_TIMEOUT);
                task.abort();
            }
        }
    }
}

impl Drop for EstimatorHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
