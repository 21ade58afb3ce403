use crate::exporter::director::WeakDirectorClient;
use crate::time::SharedClock;
use std::fmt;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Handed to an exporter in `open`. Everything it triggers ends up on the director's own queue,
/// so the exporter may call it from any thread.
#[derive(Clone)]
pub struct ExporterController {
    exporter_id: String,
    director: WeakDirectorClient,
    clock: SharedClock,
}

impl ExporterController {
    pub(crate) fn new(exporter_id: String, director: WeakDirectorClient, clock: SharedClock) -> Self {
        ExporterController {
            exporter_id,
            director,
            clock,
        }
    }

    pub fn exporter_id(&self) -> &str {
        &self.exporter_id
    }

    /// Acknowledges everything up to `position`. Lower positions than the stored one are ignored.
    pub fn update_last_exported_position(&self, position: i64) {
        self.director.update_position(self.exporter_id.clone(), position);
    }

    /// Runs `task` on the director's queue once `delay` has passed. Dropped if the director is gone
    /// by then or the returned handle was cancelled.
    pub fn schedule_delayed_task<F>(&self, delay: Duration, task: F) -> ScheduledTaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let scheduled = ScheduledTask {
            token: token.clone(),
            task: Box::new(task),
        };

        let deadline = self.clock.now() + delay;
        let clock = self.clock.clone();
        let director = self.director.clone();
        let cancelled = token.clone();
        tokio::task::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = clock.sleep_until(deadline) => director.run_task(scheduled),
            }
        });

        ScheduledTaskHandle { token }
    }
}

impl fmt::Debug for ExporterController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExporterController({})", self.exporter_id)
    }
}

pub struct ScheduledTaskHandle {
    token: CancellationToken,
}

impl ScheduledTaskHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub(crate) struct ScheduledTask {
    token: CancellationToken,
    task: Box<dyn FnOnce() + Send>,
}

impl ScheduledTask {
    /// Cancellation may have happened while the task sat in the queue.
    pub(crate) fn run(self) {
        if !self.token.is_cancelled() {
            (self.task)();
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScheduledTask(cancelled={})", self.token.is_cancelled())
    }
}
