use crate::exporter::container::{ContainerError, ExporterContainer};
use crate::exporter::controller::ExporterController;
use crate::exporter::descriptor::ExporterDescriptor;
use crate::exporter::director::client::{
    Callback, DirectorClient, DirectorCommitListener, DirectorHandle, Event, WeakDirectorClient,
};
use crate::exporter::director::context::{ExporterDirectorContext, ExporterDirectorOptionsValidated};
use crate::exporter::director::error::DirectorStartError;
use crate::exporter::api::EventFilter;
use crate::exporter::metrics::ExporterMetrics;
use crate::exporter::periodic_snapshot::{self, PeriodicSnapshotHandle};
use crate::exporter::retry::{AbortCondition, AbortableRetryStrategy, EndlessRetryStrategy};
use crate::exporter::snapshot::StateSnapshotController;
use crate::exporter::state::{ExportersState, StateError, POSITION_NONE};
use crate::logstream::{CommitListenerId, LogStream, LogStreamReader, LoggedEvent};
use crate::record::{map_record, ExportedRecord};
use crate::time::SharedClock;
use std::collections::HashSet;
use std::convert::TryFrom;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirectorState {
    /// Configuring exporters. Only seen in logs, `start` returns after it.
    Starting,
    /// Positions recovered, waiting for every exporter to open.
    Recovering,
    Running,
    /// A record is in flight, possibly waiting on a retry.
    Exporting,
    Paused,
    Closing,
    Closed,
    /// The position store failed. Exporters are closed and nothing is exported until the
    /// director is restarted.
    Failed,
}

/// Streams the committed records of one partition to every configured exporter.
///
/// Single writer: all state below is only touched from the director's own task, driven by
/// `Event`s. Records go out strictly in log order, one at a time; a record is done once every
/// exporter exported it (or had already exported it before a restart, or filtered it out).
pub struct ExporterDirector {
    logger: slog::Logger,
    partition_id: u16,
    receiver: mpsc::UnboundedReceiver<Event>,
    client: WeakDirectorClient,
    clock: SharedClock,
    state: DirectorState,

    // Flipped to false when closing. Pending retries check it before firing.
    open: Arc<AtomicBool>,
    all_opened: bool,
    in_exporting: bool,
    paused: bool,

    containers: Vec<ExporterContainer>,
    positions: ExportersState,
    snapshots: Arc<StateSnapshotController>,
    periodic_snapshot: Option<PeriodicSnapshotHandle>,

    log_stream: Arc<dyn LogStream>,
    reader: Box<dyn LogStreamReader>,
    commit_listener: Option<CommitListenerId>,
    event_filter: Option<Arc<dyn EventFilter>>,

    // Mapped record waiting on its exporters.
    current: Option<ExportedRecord>,
    // Entry waiting for another mapping attempt.
    unmapped: Option<LoggedEvent>,
    last_exported_position: i64,

    export_retry: AbortableRetryStrategy,
    open_retry: AbortableRetryStrategy,
    wrap_retry: EndlessRetryStrategy,
    metrics: Arc<ExporterMetrics>,
    close_callbacks: Vec<Callback<()>>,
}

impl ExporterDirector {
    /// Configures the exporters, recovers their positions from the latest snapshot and seeks the
    /// log right after the lowest one. Exporters are then opened and fed from the director's task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(context: ExporterDirectorContext) -> Result<DirectorHandle, DirectorStartError> {
        let (director, handle) = ExporterDirector::recover(context)?;
        tokio::task::spawn(director.run_event_loop());
        Ok(handle)
    }

    /// Everything `start` does short of spawning the event loop. The first event, opening the
    /// exporters, is already queued.
    fn recover(context: ExporterDirectorContext) -> Result<(ExporterDirector, DirectorHandle), DirectorStartError> {
        let ExporterDirectorContext {
            logger,
            log_stream,
            descriptors,
            runtime_dir,
            snapshots_dir,
            event_filter,
            options,
            clock,
        } = context;
        let options = ExporterDirectorOptionsValidated::try_from(options).map_err(DirectorStartError::InvalidOptions)?;
        let partition_id = log_stream.partition_id();
        let logger = logger.new(slog::o!("partition" => partition_id));

        slog::info!(logger, "Starting exporter director with {} exporters", descriptors.len());
        let containers = configure_exporters(&logger, &descriptors)?;

        let snapshots = Arc::new(StateSnapshotController::new(
            logger.clone(),
            runtime_dir,
            snapshots_dir,
            options.max_snapshots,
        ));
        snapshots.recover()?;
        let positions = ExportersState::new(snapshots.open_store()?);
        let lowest_position = recover_positions(&logger, &positions, &containers)?;

        let mut reader = log_stream.new_reader();
        if !reader.seek_to_position_after(lowest_position) {
            slog::error!(
                logger,
                "Exporter director failed: log has no entry at position {} to resume after",
                lowest_position
            );
            reader.close();
            snapshots.close();
            return Err(DirectorStartError::LogPositionNotFound {
                position: lowest_position,
            });
        }
        slog::info!(logger, "Recovered exporter positions, resuming after position {}", lowest_position);

        let (sender, receiver) = mpsc::unbounded_channel();
        let client = DirectorClient::new(sender);
        let weak_client = client.weak();
        let open = Arc::new(AtomicBool::new(true));
        let abort: AbortCondition = {
            let open = open.clone();
            Arc::new(move || !open.load(Ordering::Acquire))
        };
        let metrics = Arc::new(ExporterMetrics::default());

        let periodic_snapshot = periodic_snapshot::spawn_periodic_snapshots(
            logger.clone(),
            options.snapshot_period,
            clock.clone(),
            weak_client.clone(),
            snapshots.clone(),
        );

        let director = ExporterDirector {
            logger,
            partition_id,
            receiver,
            client: weak_client.clone(),
            state: DirectorState::Recovering,
            open,
            all_opened: false,
            in_exporting: false,
            paused: false,
            containers,
            positions,
            snapshots,
            periodic_snapshot: Some(periodic_snapshot),
            log_stream,
            reader,
            commit_listener: None,
            event_filter,
            current: None,
            unmapped: None,
            last_exported_position: lowest_position,
            export_retry: AbortableRetryStrategy::new(
                clock.clone(),
                abort.clone(),
                options.export_retry_initial_delay,
                options.export_retry_max_delay,
            ),
            open_retry: AbortableRetryStrategy::new(
                clock.clone(),
                abort.clone(),
                options.open_retry_initial_delay,
                options.open_retry_max_delay,
            ),
            wrap_retry: EndlessRetryStrategy::new(clock.clone(), abort, options.wrap_retry_delay),
            clock,
            metrics: metrics.clone(),
            close_callbacks: Vec::new(),
        };

        weak_client.open_exporters();
        Ok((director, DirectorHandle::new(client, metrics)))
    }

    async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            if self.handle_event(event).is_break() {
                break;
            }
        }

        // Every handle dropped without closing.
        self.close();
        self.take_final_snapshot().await;

        // Answer only once the store is released, so a restart can open it right away.
        let callbacks = std::mem::take(&mut self.close_callbacks);
        drop(self);
        for callback in callbacks {
            callback.send(());
        }
    }

    // This must NOT be async. Anything that waits (retries, scheduled tasks, snapshots) runs in
    // its own task and comes back as an event.
    fn handle_event(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::OpenExporters => self.open_exporters(),
            Event::CommitPositionUpdated | Event::Pump => self.pump(),
            Event::RetryExport => self.export_current(),
            Event::RetryWrap => self.retry_wrap(),
            Event::UpdatePosition { exporter_id, position } => self.update_position(&exporter_id, position),
            Event::RunTask(task) => task.run(),
            Event::Pause => self.pause(),
            Event::Resume => self.resume(),
            Event::LastExportedPosition(callback) => callback.send(self.last_exported_position),
            Event::State(callback) => callback.send(self.state),
            Event::Close(callback) => {
                self.close_callbacks.push(callback);
                self.close();
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn open_exporters(&mut self) {
        if !self.is_open() || self.all_opened {
            return;
        }

        for container in self.containers.iter_mut().filter(|c| !c.is_open()) {
            let controller = ExporterController::new(container.id().to_string(), self.client.clone(), self.clock.clone());
            if let Err(e) = container.open(controller) {
                slog::warn!(self.logger, "Failed to open exporter {}, retrying: {}", container.id(), e);
                let client = self.client.clone();
                self.open_retry.retry(move || client.open_exporters());
                return;
            }
        }

        self.all_opened = true;
        self.open_retry.reset();
        let listener = Arc::new(DirectorCommitListener::new(self.client.clone()));
        self.commit_listener = Some(self.log_stream.register_commit_listener(listener));
        self.state = self.idle_state();
        slog::info!(self.logger, "All exporters open, exporting");

        self.pump();
    }

    fn idle_state(&self) -> DirectorState {
        if self.paused {
            DirectorState::Paused
        } else {
            DirectorState::Running
        }
    }

    fn pump(&mut self) {
        if !self.is_open()
            || !self.all_opened
            || self.in_exporting
            || self.paused
            || self.state == DirectorState::Failed
        {
            return;
        }

        // Nothing committed to read: the commit listener pumps again.
        if !self.reader.has_next() {
            return;
        }
        let event = match self.reader.next() {
            Some(event) => event,
            None => return,
        };

        self.in_exporting = true;
        self.state = DirectorState::Exporting;

        if let Some(filter) = &self.event_filter {
            if !filter.applies(&event) {
                self.skip_record(event.position);
                return;
            }
        }
        self.wrap(event);
    }

    fn wrap(&mut self, event: LoggedEvent) {
        match map_record(self.partition_id, &event) {
            Ok(Some(record)) => {
                self.current = Some(record);
                self.export_current();
            }
            Ok(None) => self.skip_record(event.position),
            Err(e) => {
                slog::warn!(self.logger, "Failed to map record, retrying: {}", e);
                self.unmapped = Some(event);
                let client = self.client.clone();
                self.wrap_retry.retry(move || client.retry_wrap());
            }
        }
    }

    fn retry_wrap(&mut self) {
        if !self.is_open() {
            return;
        }

        if let Some(event) = self.unmapped.take() {
            self.wrap(event);
        }
    }

    fn export_current(&mut self) {
        if !self.is_open() || self.state == DirectorState::Failed {
            return;
        }
        let record = match &self.current {
            Some(record) => record,
            None => return,
        };
        let position = record.position;

        let positions = &self.positions;
        let result = self.containers.iter_mut().try_for_each(|container| {
            container
                .export(positions, record)
                .map(|_| ())
                .map_err(|e| (container.id().to_string(), e))
        });

        match result {
            Ok(()) => {
                self.metrics.event_exported(position);
                self.finish_record(position);
            }
            Err((exporter_id, ContainerError::Exporter(e))) => {
                self.metrics.export_failed();
                slog::warn!(
                    self.logger,
                    "Exporter {} failed to export record at position {}, retrying: {}",
                    exporter_id,
                    position,
                    e
                );
                let client = self.client.clone();
                self.export_retry.retry(move || client.retry_export());
            }
            Err((_, ContainerError::State(e))) => self.fail(e),
        }
    }

    /// Moves every exporter past a record none of them gets to see.
    fn skip_record(&mut self, position: i64) {
        let positions = &self.positions;
        let result = self
            .containers
            .iter()
            .try_for_each(|container| positions.set_if_greater(container.id(), position));
        if let Err(e) = result {
            self.fail(e);
            return;
        }

        self.metrics.event_skipped(position);
        self.finish_record(position);
    }

    fn finish_record(&mut self, position: i64) {
        self.current = None;
        self.in_exporting = false;
        self.last_exported_position = position;
        self.export_retry.reset();
        self.state = self.idle_state();

        self.client.pump();
    }

    fn update_position(&mut self, exporter_id: &str, position: i64) {
        if !self.containers.iter().any(|c| c.id() == exporter_id) {
            slog::warn!(self.logger, "Position update from unknown exporter {}", exporter_id);
            return;
        }

        if let Err(e) = self.positions.set_if_greater(exporter_id, position) {
            self.fail(e);
        }
    }

    fn pause(&mut self) {
        self.paused = true;
        if self.state == DirectorState::Running {
            self.state = DirectorState::Paused;
        }
        slog::info!(self.logger, "Paused exporting");
    }

    fn resume(&mut self) {
        self.paused = false;
        if self.state == DirectorState::Paused {
            self.state = DirectorState::Running;
        }
        slog::info!(self.logger, "Resumed exporting");

        self.pump();
    }

    /// The position store can't be trusted any more. Exporters and the log are let go right away;
    /// the actor itself only answers queries and `close` from here on.
    fn fail(&mut self, error: StateError) {
        slog::error!(self.logger, "Exporter director failed: {}", error);
        if !matches!(self.state, DirectorState::Closing | DirectorState::Closed) {
            self.state = DirectorState::Failed;
        }
        self.release_resources();
    }

    /// Closes the exporters and detaches from the log. Safe to call more than once.
    fn release_resources(&mut self) {
        self.open.store(false, Ordering::Release);
        self.periodic_snapshot = None;
        self.current = None;
        self.unmapped = None;
        self.in_exporting = false;

        for container in self.containers.iter_mut() {
            container.close();
        }

        self.reader.close();
        if let Some(id) = self.commit_listener.take() {
            self.log_stream.unregister_commit_listener(id);
        }
    }

    fn close(&mut self) {
        if matches!(self.state, DirectorState::Closing | DirectorState::Closed) {
            return;
        }

        slog::info!(self.logger, "Closing exporter director");
        self.state = DirectorState::Closing;
        self.release_resources();

        // Exporters may still acknowledge while closing. Those must make the final snapshot.
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                Event::UpdatePosition { exporter_id, position } => self.update_position(&exporter_id, position),
                Event::Close(callback) => self.close_callbacks.push(callback),
                _ => {}
            }
        }
    }

    async fn take_final_snapshot(&mut self) {
        let position = self.last_exported_position;
        let snapshots = self.snapshots.clone();
        // Checkpointing touches the disk, keep it off the async workers.
        match tokio::task::spawn_blocking(move || snapshots.take_snapshot(position)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => slog::error!(self.logger, "Failed to take final snapshot at position {}: {}", position, e),
            Err(e) => slog::error!(self.logger, "Final snapshot task panicked: {}", e),
        }
        self.snapshots.close();

        self.state = DirectorState::Closed;
        slog::info!(self.logger, "Closed exporter director");
    }
}

impl fmt::Debug for ExporterDirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExporterDirector(partition={}, state={:?}, last_exported={})",
            self.partition_id, self.state, self.last_exported_position
        )
    }
}

fn configure_exporters(
    logger: &slog::Logger,
    descriptors: &[ExporterDescriptor],
) -> Result<Vec<ExporterContainer>, DirectorStartError> {
    let mut ids = HashSet::new();
    let mut containers = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if !ids.insert(descriptor.id()) {
            return Err(DirectorStartError::DuplicateExporterId(descriptor.id().to_string()));
        }

        let container = ExporterContainer::configure(descriptor, logger).map_err(|source| {
            DirectorStartError::Configure {
                id: descriptor.id().to_string(),
                source,
            }
        })?;
        containers.push(container);
    }

    Ok(containers)
}

/// Drops positions of exporters that are no longer configured, registers new exporters with no
/// position and returns the position reading must resume after.
fn recover_positions(
    logger: &slog::Logger,
    positions: &ExportersState,
    containers: &[ExporterContainer],
) -> Result<i64, StateError> {
    let configured: HashSet<&str> = containers.iter().map(|c| c.id()).collect();
    for exporter_id in positions.exporter_ids()? {
        if !configured.contains(exporter_id.as_str()) {
            positions.remove(&exporter_id)?;
            slog::info!(logger, "Removed position of exporter {}, it is no longer configured", exporter_id);
        }
    }

    for container in containers {
        // Without an entry the new exporter wouldn't hold back the lowest position.
        if positions.get(container.id())? == POSITION_NONE {
            positions.set(container.id(), POSITION_NONE)?;
        }
    }

    positions.lowest_position()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::api::{Exporter, ExporterError};
    use crate::logging::discard_logger;
    use crate::logstream::{InMemoryLogStream, RecordMetadata, ValueType};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Seen {
        positions: Arc<Mutex<Vec<i64>>>,
        closed: Arc<AtomicBool>,
    }

    struct SeenExporter(Seen);

    impl Exporter for SeenExporter {
        fn export(&mut self, record: &ExportedRecord) -> Result<(), ExporterError> {
            self.0.positions.lock().unwrap().push(record.position);
            Ok(())
        }

        fn close(&mut self) -> Result<(), ExporterError> {
            self.0.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    fn append_committed_job(log: &Arc<dyn LogStream>) {
        let mut event = LoggedEvent::new(RecordMetadata::event(ValueType::Job, 0), &b"{}"[..]);
        event.position = log.next_position();
        event.raft_term = 1;
        log.append(event).unwrap();
        log.set_commit_position(log.next_position() - 1);
    }

    #[tokio::test]
    async fn failed_store_releases_exporters_and_log() {
        // -- setup --
        let dir = tempfile::tempdir().unwrap();
        let log = InMemoryLogStream::shared(1);
        append_committed_job(&log);
        let seen = Seen::default();
        let exporter_seen = seen.clone();
        let context = ExporterDirectorContext::new(discard_logger(), log.clone(), dir.path()).with_exporter(
            ExporterDescriptor::new("a", serde_json::Value::Null, move || {
                Box::new(SeenExporter(exporter_seen.clone()))
            }),
        );
        let (mut director, _handle) = ExporterDirector::recover(context).unwrap();
        let _ = director.handle_event(Event::OpenExporters);
        assert_eq!(*seen.positions.lock().unwrap(), vec![1]);
        assert!(director.commit_listener.is_some());

        // -- execute --
        director.fail(StateError::MalformedPosition {
            exporter_id: "a".to_string(),
            length: 3,
        });

        // -- verify --
        assert_eq!(director.state, DirectorState::Failed);
        assert!(seen.closed.load(Ordering::Acquire));
        assert!(!director.is_open());
        assert!(!director.in_exporting);
        assert!(director.commit_listener.is_none());
        assert!(director.periodic_snapshot.is_none());

        // New commits no longer reach the exporter.
        append_committed_job(&log);
        let _ = director.handle_event(Event::CommitPositionUpdated);
        assert_eq!(*seen.positions.lock().unwrap(), vec![1]);

        // Closing afterwards still ends in `Closed` with a final snapshot.
        director.close();
        director.take_final_snapshot().await;
        assert_eq!(director.state, DirectorState::Closed);
        assert_eq!(director.snapshots.latest_snapshot_position().unwrap(), Some(1));
    }
}
