mod api;
mod container;
mod controller;
mod descriptor;
mod director;
mod metrics;
mod periodic_snapshot;
mod retry;
mod snapshot;
mod state;
mod stop_signal;

pub use api::{
    EventFilter, Exporter, ExporterConfiguration, ExporterContext, ExporterError, RecordFilter, SkipPositionsFilter,
};
pub use controller::{ExporterController, ScheduledTaskHandle};
pub use descriptor::{ExporterDescriptor, ExporterFactory};
pub use director::{
    DirectorClosed, DirectorHandle, DirectorStartError, DirectorState, ExporterDirector, ExporterDirectorContext,
    ExporterDirectorOptions, WeakDirectorClient,
};
pub use metrics::ExporterMetrics;
pub use snapshot::{SnapshotError, StateSnapshotController};
pub use state::{ExportersState, StateError, POSITION_NONE};
