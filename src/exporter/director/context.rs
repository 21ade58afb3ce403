use crate::exporter::api::EventFilter;
use crate::exporter::descriptor::ExporterDescriptor;
use crate::logstream::LogStream;
use crate::time::{RealClock, SharedClock};
use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct ExporterDirectorOptions {
    /// How often the position store is snapshotted while running.
    pub snapshot_period: Option<Duration>,
    /// Snapshots kept on disk.
    pub max_snapshots: Option<usize>,
    pub export_retry_initial_delay: Option<Duration>,
    pub export_retry_max_delay: Option<Duration>,
    /// Fixed delay between attempts to map an unreadable record.
    pub wrap_retry_delay: Option<Duration>,
    pub open_retry_initial_delay: Option<Duration>,
    pub open_retry_max_delay: Option<Duration>,
}

pub(super) struct ExporterDirectorOptionsValidated {
    pub(super) snapshot_period: Duration,
    pub(super) max_snapshots: usize,
    pub(super) export_retry_initial_delay: Duration,
    pub(super) export_retry_max_delay: Duration,
    pub(super) wrap_retry_delay: Duration,
    pub(super) open_retry_initial_delay: Duration,
    pub(super) open_retry_max_delay: Duration,
}

impl ExporterDirectorOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.snapshot_period.is_zero() {
            return Err("Snapshot period must be positive");
        }
        if self.max_snapshots < 1 {
            return Err("At least one snapshot must be kept");
        }
        if self.export_retry_initial_delay.is_zero() || self.open_retry_initial_delay.is_zero() {
            return Err("Initial retry delays must be positive");
        }
        if self.wrap_retry_delay.is_zero() {
            return Err("Wrap retry delay must be positive");
        }
        if self.export_retry_initial_delay > self.export_retry_max_delay {
            return Err("Export retry initial delay must not exceed the maximum delay");
        }
        if self.open_retry_initial_delay > self.open_retry_max_delay {
            return Err("Open retry initial delay must not exceed the maximum delay");
        }

        Ok(())
    }
}

impl TryFrom<ExporterDirectorOptions> for ExporterDirectorOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ExporterDirectorOptions) -> Result<Self, Self::Error> {
        let values = ExporterDirectorOptionsValidated {
            snapshot_period: options.snapshot_period.unwrap_or(Duration::from_secs(60)),
            max_snapshots: options.max_snapshots.unwrap_or(3),
            export_retry_initial_delay: options
                .export_retry_initial_delay
                .unwrap_or(Duration::from_millis(100)),
            export_retry_max_delay: options.export_retry_max_delay.unwrap_or(Duration::from_secs(10)),
            wrap_retry_delay: options.wrap_retry_delay.unwrap_or(Duration::from_secs(1)),
            open_retry_initial_delay: options
                .open_retry_initial_delay
                .unwrap_or(Duration::from_millis(100)),
            open_retry_max_delay: options.open_retry_max_delay.unwrap_or(Duration::from_secs(10)),
        };

        values.validate()?;
        Ok(values)
    }
}

/// Everything a director is started with. Consumed by `ExporterDirector::start`; a restart takes a
/// new context.
pub struct ExporterDirectorContext {
    pub logger: slog::Logger,
    pub log_stream: Arc<dyn LogStream>,
    /// Exporters in the order every record is handed to them.
    pub descriptors: Vec<ExporterDescriptor>,
    pub runtime_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub event_filter: Option<Arc<dyn EventFilter>>,
    pub options: ExporterDirectorOptions,
    pub clock: SharedClock,
}

impl ExporterDirectorContext {
    /// Context keeping the position store under `data_dir`, with no exporters, default options and
    /// the real clock.
    pub fn new(logger: slog::Logger, log_stream: Arc<dyn LogStream>, data_dir: &Path) -> Self {
        ExporterDirectorContext {
            logger,
            log_stream,
            descriptors: Vec::new(),
            runtime_dir: data_dir.join("runtime"),
            snapshots_dir: data_dir.join("snapshots"),
            event_filter: None,
            options: ExporterDirectorOptions::default(),
            clock: RealClock::shared(),
        }
    }

    pub fn with_exporter(mut self, descriptor: ExporterDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn with_event_filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.event_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_options(mut self, options: ExporterDirectorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}
