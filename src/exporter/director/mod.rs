mod actor;
mod client;
mod context;
mod error;

pub use actor::{DirectorState, ExporterDirector};
pub use client::{DirectorHandle, WeakDirectorClient};
pub use context::{ExporterDirectorContext, ExporterDirectorOptions};
pub use error::{DirectorClosed, DirectorStartError};
