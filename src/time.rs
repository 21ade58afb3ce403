use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Clock is the only source of "now" and of delays for the exporter pipeline. Everything that
/// sleeps (retries, scheduled exporter tasks, periodic snapshots) goes through it so tests can
/// drive time by hand.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep_until(&self, deadline: Instant);

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Copy, Clone, Default)]
pub struct RealClock;

impl RealClock {
    pub fn shared() -> SharedClock {
        Arc::new(RealClock)
    }
}

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

pub fn mocked_clock() -> (MockClock, MockClockController) {
    let now = Instant::now();
    let (tx, rx) = watch::channel(now);
    let sleeper = MockClock { current_time: rx };
    let controller = MockClockController {
        current_time: tx,
        time_of_instantiation: now,
    };

    (sleeper, controller)
}

#[derive(Clone)]
pub struct MockClock {
    current_time: watch::Receiver<Instant>,
}

#[async_trait::async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.borrow()
    }

    async fn sleep_until(&self, deadline: Instant) {
        let mut current_time = self.current_time.clone();
        loop {
            if *current_time.borrow_and_update() >= deadline {
                return;
            }

            if current_time.changed().await.is_err() {
                // Controller dropped, time will never move again.
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct MockClockController {
    current_time: watch::Sender<Instant>,
    time_of_instantiation: Instant,
}

impl MockClockController {
    pub fn current_time(&self) -> Instant {
        *self.current_time.borrow()
    }

    pub fn elapsed_time(&self) -> Duration {
        self.current_time() - self.time_of_instantiation
    }

    /// Advancing by large steps of time can cause surprising behavior in `sleep_until()` usage.
    /// The only promise of mock `sleep_until` is that it will return when `now` is at or past
    /// the `deadline`. Advance the mock clock at much smaller increments than the granularity at
    /// which you wish to observe things.
    pub fn advance(&mut self, duration: Duration) {
        let new_now = self.current_time() + duration;
        // Sleepers may all be gone. That's fine, `now` still moves.
        self.current_time.send_replace(new_now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    #[tokio::test]
    async fn mock_clock() {
        let tick_duration = Duration::from_millis(500);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let (mock_clock, mut controller) = mocked_clock();
        let test_start_time = controller.current_time();

        tokio::spawn(async move {
            let mut next_wake = test_start_time;
            loop {
                next_wake += tick_duration;
                mock_clock.sleep_until(next_wake).await;
                tx.send(()).expect("receiver shouldn't drop");
            }
        });

        // Create half-tick offset just to make it easier to follow and avoid off-by-1.
        controller.advance(tick_duration / 2);
        tokio::time::timeout(tick_duration * 2, rx.recv())
            .await
            .expect_err("Expected timeout");

        controller.advance(tick_duration);
        rx.recv().await.unwrap();
        tokio::time::timeout(tick_duration * 2, rx.recv())
            .await
            .expect_err("Expected timeout");

        // Advance multiple ticks at once
        controller.advance(tick_duration * 3);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        tokio::time::timeout(tick_duration * 2, rx.recv())
            .await
            .expect_err("Expected timeout");

        assert_eq!(controller.elapsed_time(), tick_duration * 9 / 2);
    }
}
