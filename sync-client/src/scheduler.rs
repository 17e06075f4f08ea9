//! Cancellable repeating tasks.
//!
//! A [`RepeatingTask`] calls a closure once per period on the tokio runtime
//! until it is cancelled or dropped.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// A repeating background task. Dropping it cancels the task.
#[derive(Debug)]
pub struct RepeatingTask {
    period: Duration,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawn a task calling `tick` every `period`, first after one period.
    pub fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                tick();
            }
        });
        Self { period, handle }
    }

    /// The period the task was spawned with.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
