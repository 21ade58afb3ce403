use crate::exporter::api::ExporterError;
use crate::exporter::snapshot::SnapshotError;
use crate::exporter::state::StateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectorStartError {
    #[error("invalid exporter director options: {0}")]
    InvalidOptions(&'static str),

    #[error("exporter id '{0}' is configured more than once")]
    DuplicateExporterId(String),

    #[error("failed to configure exporter '{id}'")]
    Configure {
        id: String,
        #[source]
        source: ExporterError,
    },

    #[error("failed to recover the position store")]
    Snapshot(#[from] SnapshotError),

    #[error("failed to read exporter positions")]
    State(#[from] StateError),

    /// The log no longer holds the entry exporting would resume after. Not retryable.
    #[error("log has no entry at position {position} to resume exporting after")]
    LogPositionNotFound { position: i64 },
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("exporter director is closed")]
pub struct DirectorClosed;
