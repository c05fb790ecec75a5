//! Cancellable one-shot timers.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::warn;

/// Work to run when a timer fires
pub type Task = BoxFuture<'static, ()>;

/// Schedules a task to run once after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Handle to a scheduled task. Cancelling or dropping the handle stops the
/// task if it has not fired yet.
pub struct ScheduledTask {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduledTask {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle for a task that was never armed
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    /// Let go of the handle without stopping the task. Used once the task
    /// has fired and is running.
    pub fn disarm(mut self) {
        self.cancel.take();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Timers backed by `tokio::time::sleep` on the current runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No Tokio runtime available, timer not armed");
            return ScheduledTask::detached();
        };
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        ScheduledTask::new(move || handle.abort())
    }
}
