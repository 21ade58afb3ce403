use crate::exporter::controller::ScheduledTask;
use crate::exporter::director::actor::DirectorState;
use crate::exporter::director::error::DirectorClosed;
use crate::exporter::metrics::ExporterMetrics;
use crate::exporter::periodic_snapshot::ExportedPositionSource;
use crate::logstream::CommitListener;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub(super) enum Event {
    // Open every exporter not open yet. Once all are, start listening for commits and pump.
    OpenExporters,

    // More of the log is committed: pump.
    CommitPositionUpdated,

    // Read, map and export the next committed record unless one is in flight.
    Pump,

    // Hand the in-flight record to the exporters again.
    RetryExport,

    // Map the record that failed to map again.
    RetryWrap,

    // An exporter acknowledged up to a position.
    UpdatePosition { exporter_id: String, position: i64 },

    // A task an exporter scheduled is due.
    RunTask(ScheduledTask),

    Pause,
    Resume,
    LastExportedPosition(Callback<i64>),
    State(Callback<DirectorState>),

    // Close exporters, take the final snapshot, release everything and exit the loop.
    Close(Callback<()>),
}

#[derive(Debug)]
pub(super) struct Callback<T: Debug>(oneshot::Sender<T>);

impl<T: Debug> Callback<T> {
    pub(super) fn send(self, message: T) {
        let _ = self.0.send(message);
    }
}

#[derive(Clone)]
pub(super) struct DirectorClient {
    sender: mpsc::UnboundedSender<Event>,
}

impl DirectorClient {
    pub(super) fn new(sender: mpsc::UnboundedSender<Event>) -> Self {
        DirectorClient { sender }
    }

    pub(super) fn weak(&self) -> WeakDirectorClient {
        WeakDirectorClient {
            sender: self.sender.downgrade(),
        }
    }

    fn send(&self, event: Event) -> Result<(), DirectorClosed> {
        self.sender.send(event).map_err(|_| DirectorClosed)
    }

    async fn call<T: Debug>(&self, event: impl FnOnce(Callback<T>) -> Event) -> Result<T, DirectorClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(event(Callback(tx)))?;
        rx.await.map_err(|_| DirectorClosed)
    }
}

/// Handle on a running exporter director. Dropping it without `close()` also shuts the director
/// down, once everything it queued has been handled.
pub struct DirectorHandle {
    client: DirectorClient,
    metrics: Arc<ExporterMetrics>,
}

impl DirectorHandle {
    pub(super) fn new(client: DirectorClient, metrics: Arc<ExporterMetrics>) -> Self {
        DirectorHandle { client, metrics }
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Stops handing out records. Acknowledgements are still applied.
    pub fn pause_exporting(&self) -> Result<(), DirectorClosed> {
        self.client.send(Event::Pause)
    }

    pub fn resume_exporting(&self) -> Result<(), DirectorClosed> {
        self.client.send(Event::Resume)
    }

    pub async fn state(&self) -> Result<DirectorState, DirectorClosed> {
        self.client.call(Event::State).await
    }

    /// Position of the last record every exporter is done with.
    pub async fn last_exported_position(&self) -> Result<i64, DirectorClosed> {
        self.client.call(Event::LastExportedPosition).await
    }

    /// Resolves once exporters are closed, the final snapshot is written and the position store
    /// is released.
    pub async fn close(self) -> Result<(), DirectorClosed> {
        self.client.call(Event::Close).await
    }
}

/// Client for everything that must not keep the director alive: timers, retries, exporter
/// controllers, the commit listener. Calls on a gone director are dropped.
#[derive(Clone)]
pub struct WeakDirectorClient {
    sender: mpsc::WeakUnboundedSender<Event>,
}

impl WeakDirectorClient {
    fn send(&self, event: Event) -> Result<(), DirectorClosed> {
        let sender = self.sender.upgrade().ok_or(DirectorClosed)?;
        sender.send(event).map_err(|_| DirectorClosed)
    }

    pub(crate) fn update_position(&self, exporter_id: String, position: i64) {
        let _ = self.send(Event::UpdatePosition { exporter_id, position });
    }

    pub(crate) fn run_task(&self, task: ScheduledTask) {
        let _ = self.send(Event::RunTask(task));
    }

    pub(super) fn open_exporters(&self) {
        let _ = self.send(Event::OpenExporters);
    }

    pub(super) fn pump(&self) {
        let _ = self.send(Event::Pump);
    }

    pub(super) fn retry_export(&self) {
        let _ = self.send(Event::RetryExport);
    }

    pub(super) fn retry_wrap(&self) {
        let _ = self.send(Event::RetryWrap);
    }
}

#[async_trait::async_trait]
impl ExportedPositionSource for WeakDirectorClient {
    async fn last_exported_position(&self) -> Option<i64> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::LastExportedPosition(Callback(tx))).ok()?;
        rx.await.ok()
    }
}

pub(super) struct DirectorCommitListener {
    director: WeakDirectorClient,
}

impl DirectorCommitListener {
    pub(super) fn new(director: WeakDirectorClient) -> Self {
        DirectorCommitListener { director }
    }
}

impl CommitListener for DirectorCommitListener {
    fn on_commit(&self, _commit_position: i64) {
        let _ = self.director.send(Event::CommitPositionUpdated);
    }
}
