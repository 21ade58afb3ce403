use crate::time::SharedClock;
use rand::Rng;
use std::sync::Arc;
use tokio::time::Duration;

/// Consulted right before a retry fires. Once it returns true the retry is dropped.
pub(crate) type AbortCondition = Arc<dyn Fn() -> bool + Send + Sync>;

fn schedule<F>(clock: SharedClock, delay: Duration, abort: AbortCondition, retry: F)
where
    F: FnOnce() + Send + 'static,
{
    // Deadline taken now, not when the task first gets polled.
    let deadline = clock.now() + delay;
    tokio::task::spawn(async move {
        clock.sleep_until(deadline).await;
        if !abort() {
            retry();
        }
    });
}

/// Retries with exponential, jittered backoff. Used for failures outside our control (an exporter
/// failing to open or export), which tend to clear up slowly.
pub(crate) struct AbortableRetryStrategy {
    clock: SharedClock,
    abort: AbortCondition,
    initial_delay: Duration,
    max_delay: Duration,
    next_delay: Duration,
}

impl AbortableRetryStrategy {
    pub(crate) fn new(clock: SharedClock, abort: AbortCondition, initial_delay: Duration, max_delay: Duration) -> Self {
        AbortableRetryStrategy {
            clock,
            abort,
            initial_delay,
            max_delay,
            next_delay: initial_delay,
        }
    }

    pub(crate) fn retry<F>(&mut self, retry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.next_delay();
        schedule(self.clock.clone(), delay, self.abort.clone(), retry);
    }

    /// Back to the initial delay, after the operation finally went through.
    pub(crate) fn reset(&mut self) {
        self.next_delay = self.initial_delay;
    }

    fn next_delay(&mut self) -> Duration {
        let ceiling = self.next_delay;
        self.next_delay = (ceiling * 2).min(self.max_delay);

        rand::thread_rng().gen_range(ceiling / 2..=ceiling)
    }
}

/// Retries at a fixed delay until it works or the abort condition trips. Used for decoding a
/// record, which must never be skipped.
pub(crate) struct EndlessRetryStrategy {
    clock: SharedClock,
    abort: AbortCondition,
    delay: Duration,
}

impl EndlessRetryStrategy {
    pub(crate) fn new(clock: SharedClock, abort: AbortCondition, delay: Duration) -> Self {
        EndlessRetryStrategy { clock, abort, delay }
    }

    pub(crate) fn retry<F>(&self, retry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        schedule(self.clock.clone(), self.delay, self.abort.clone(), retry);
    }
}
