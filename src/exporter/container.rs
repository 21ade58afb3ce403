use crate::exporter::api::{self, Exporter, ExporterContext, ExporterError, RecordFilter};
use crate::exporter::controller::ExporterController;
use crate::exporter::descriptor::ExporterDescriptor;
use crate::exporter::state::{ExportersState, StateError};
use crate::record::ExportedRecord;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ExportOutcome {
    /// Stored position already covers the record, e.g. replayed after a restart.
    AlreadyExported,
    /// The exporter's filter declined it. Its position moved on anyway.
    Filtered,
    Exported,
}

#[derive(Error, Debug)]
pub(crate) enum ContainerError {
    #[error("exporter position unavailable")]
    State(#[from] StateError),

    #[error("export failed")]
    Exporter(#[from] ExporterError),
}

/// One configured exporter instance plus what the director tracks about it.
pub(crate) struct ExporterContainer {
    id: String,
    logger: slog::Logger,
    exporter: Box<dyn Exporter>,
    filter: Option<Arc<dyn RecordFilter>>,
    opened: bool,
}

impl ExporterContainer {
    pub(crate) fn configure(descriptor: &ExporterDescriptor, logger: &slog::Logger) -> Result<Self, ExporterError> {
        let logger = logger.new(slog::o!("exporter" => descriptor.id().to_string()));
        let mut exporter = descriptor.create();
        let mut context = ExporterContext::new(logger, descriptor.configuration().clone());
        exporter.configure(&mut context)?;

        let (logger, filter) = context.into_parts();
        slog::debug!(logger, "Configured exporter");
        Ok(ExporterContainer {
            id: descriptor.id().to_string(),
            logger,
            exporter,
            filter,
            opened: false,
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        self.opened
    }

    pub(crate) fn open(&mut self, controller: ExporterController) -> Result<(), ExporterError> {
        if self.opened {
            return Ok(());
        }

        self.exporter.open(controller)?;
        self.opened = true;
        slog::info!(self.logger, "Opened exporter");
        Ok(())
    }

    pub(crate) fn export(
        &mut self,
        state: &ExportersState,
        record: &ExportedRecord,
    ) -> Result<ExportOutcome, ContainerError> {
        if state.get(&self.id)? >= record.position {
            return Ok(ExportOutcome::AlreadyExported);
        }

        if let Some(filter) = &self.filter {
            if !api::accepts(filter.as_ref(), record) {
                state.set_if_greater(&self.id, record.position)?;
                return Ok(ExportOutcome::Filtered);
            }
        }

        self.exporter.export(record)?;
        state.set_if_greater(&self.id, record.position)?;
        Ok(ExportOutcome::Exported)
    }

    /// Failing to close is logged and otherwise ignored.
    pub(crate) fn close(&mut self) {
        if !self.opened {
            return;
        }

        self.opened = false;
        match self.exporter.close() {
            Ok(()) => slog::info!(self.logger, "Closed exporter"),
            Err(e) => slog::warn!(self.logger, "Failed to close exporter: {}", e),
        }
    }
}
