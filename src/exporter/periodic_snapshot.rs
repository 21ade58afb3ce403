use crate::exporter::snapshot::StateSnapshotController;
use crate::exporter::stop_signal::{self, StopCheck, Stopper};
use crate::time::SharedClock;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Where the periodic snapshot gets the position to name a snapshot after.
#[async_trait::async_trait]
pub(crate) trait ExportedPositionSource: Send + Sync + 'static {
    /// `None` once the source is gone for good.
    async fn last_exported_position(&self) -> Option<i64>;
}

/// Keeps the periodic snapshot task alive. Dropping it stops the task.
pub(crate) struct PeriodicSnapshotHandle {
    _stopper: Stopper,
}

struct PeriodicSnapshotTask<P: ExportedPositionSource> {
    logger: slog::Logger,
    period: Duration,
    next_tick: Instant,
    clock: SharedClock,
    source: P,
    snapshots: Arc<StateSnapshotController>,
    stop_check: StopCheck,
    last_snapshot_position: Option<i64>,
}

pub(crate) fn spawn_periodic_snapshots<P: ExportedPositionSource>(
    logger: slog::Logger,
    period: Duration,
    clock: SharedClock,
    source: P,
    snapshots: Arc<StateSnapshotController>,
) -> PeriodicSnapshotHandle {
    let (stopper, stop_check) = stop_signal::new();
    let task = PeriodicSnapshotTask {
        logger,
        period,
        next_tick: clock.now() + period,
        clock,
        source,
        snapshots,
        stop_check,
        last_snapshot_position: None,
    };
    tokio::task::spawn(task.run());

    PeriodicSnapshotHandle { _stopper: stopper }
}

impl<P: ExportedPositionSource> PeriodicSnapshotTask<P> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.stop_check.stopped() => return,
                _ = self.clock.sleep_until(self.next_tick) => {}
            }
            self.next_tick += self.period;
            if self.stop_check.should_stop() {
                return;
            }

            let position = match self.source.last_exported_position().await {
                Some(position) => position,
                None => return,
            };
            if self.last_snapshot_position == Some(position) {
                continue;
            }

            // Checkpointing touches the disk, keep it off the async workers.
            let snapshots = self.snapshots.clone();
            match tokio::task::spawn_blocking(move || snapshots.take_snapshot(position)).await {
                Ok(Ok(())) => {
                    slog::debug!(self.logger, "Periodic snapshot at position {}", position);
                    self.last_snapshot_position = Some(position);
                }
                Ok(Err(e)) => slog::warn!(self.logger, "Periodic snapshot at position {} failed: {}", position, e),
                Err(e) => slog::error!(self.logger, "Periodic snapshot task panicked: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::discard_logger;
    use crate::time;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeSource(Arc<AtomicI64>);

    #[async_trait::async_trait]
    impl ExportedPositionSource for FakeSource {
        async fn last_exported_position(&self) -> Option<i64> {
            Some(self.0.load(Ordering::Acquire))
        }
    }

    async fn wait_for_snapshot(snapshots: &StateSnapshotController, expected: i64) {
        for _ in 0..100 {
            if snapshots.latest_snapshot_position().unwrap() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("No snapshot at position {}", expected);
    }

    #[tokio::test]
    async fn snapshots_on_every_tick_with_new_position() {
        // -- setup --
        let period = Duration::from_secs(60);
        let dir = tempfile::tempdir().unwrap();
        let snapshots = Arc::new(StateSnapshotController::new(
            discard_logger(),
            dir.path().join("runtime"),
            dir.path().join("snapshots"),
            3,
        ));
        snapshots.recover().unwrap();
        let _db = snapshots.open_store().unwrap();
        let position = Arc::new(AtomicI64::new(5));
        let (clock, mut controller) = time::mocked_clock();

        // -- execute & verify --
        let handle = spawn_periodic_snapshots(
            discard_logger(),
            period,
            Arc::new(clock),
            FakeSource(position.clone()),
            snapshots.clone(),
        );
        assert_eq!(snapshots.latest_snapshot_position().unwrap(), None);

        controller.advance(period);
        wait_for_snapshot(&snapshots, 5).await;

        position.store(9, Ordering::Release);
        controller.advance(period);
        wait_for_snapshot(&snapshots, 9).await;

        // Stopped tasks take no more snapshots.
        drop(handle);
        position.store(12, Ordering::Release);
        controller.advance(period);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(snapshots.latest_snapshot_position().unwrap(), Some(9));
    }
}
