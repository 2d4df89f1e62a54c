//! Periodic refresh.
//!
//! A tick is armed only after the previous tick's work has finished, so
//! ticks never overlap no matter how long the work takes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Runs a task at a fixed interval on the current Tokio runtime.
#[derive(Debug)]
pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Start calling `task` every `interval`.
    ///
    /// The first call happens one interval after spawning. The returned
    /// handle stops the loop when shut down or dropped.
    pub fn spawn<F, Fut>(interval: Duration, mut task: F) -> SchedulerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let ticks = Arc::new(AtomicU64::new(0));

        let stop = Arc::clone(&stop_signal);
        let woken = Arc::clone(&wake);
        let count = Arc::clone(&ticks);
        let join = tokio::spawn(async move {
            debug!("Refresh scheduler started ({:?})", interval);
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    () = woken.notified() => {}
                }
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                trace!("Refresh tick");
                task().await;
                count.fetch_add(1, Ordering::SeqCst);
            }
            debug!("Refresh scheduler stopped");
        });

        SchedulerHandle {
            stop_signal,
            wake,
            ticks,
            join: Some(join),
        }
    }
}

/// Control handle for a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop_signal: Arc<AtomicBool>,
    wake: Arc<Notify>,
    ticks: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop. A tick in progress runs to completion.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Stop the scheduler and wait for its task to exit.
    ///
    /// No tick starts after this returns.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                debug!("Refresh task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
