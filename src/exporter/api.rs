use crate::exporter::controller::ExporterController;
use crate::logstream::{LoggedEvent, RecordType, ValueType};
use crate::record::{ExportedRecord, Intent};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("invalid exporter configuration")]
    Configuration(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),

    #[error("exporter failed")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ExporterError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExporterError::Failed(message.into())
    }
}

/// A downstream consumer of committed records.
///
/// Lifecycle, all calls made from the director's task: `configure` once at startup, `open` once
/// (retried until it succeeds), `export` for every record in position order, `close` on shutdown.
///
/// A failing `export` is retried with the same record until it succeeds. Records are handed out at
/// least once: after a restart, an exporter gets everything after its last acknowledged position
/// again.
pub trait Exporter: Send {
    fn configure(&mut self, _context: &mut ExporterContext) -> Result<(), ExporterError> {
        Ok(())
    }

    fn open(&mut self, _controller: ExporterController) -> Result<(), ExporterError> {
        Ok(())
    }

    fn export(&mut self, record: &ExportedRecord) -> Result<(), ExporterError>;

    fn close(&mut self) -> Result<(), ExporterError> {
        Ok(())
    }
}

/// Id and arguments an exporter was configured with.
#[derive(Debug, Clone)]
pub struct ExporterConfiguration {
    id: String,
    arguments: serde_json::Value,
}

impl ExporterConfiguration {
    pub fn new(id: impl Into<String>, arguments: serde_json::Value) -> Self {
        ExporterConfiguration {
            id: id.into(),
            arguments,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }

    /// Deserializes the arguments into the exporter's own configuration type. Missing arguments
    /// read as an empty object.
    pub fn instantiate<T: DeserializeOwned>(&self) -> Result<T, ExporterError> {
        let arguments = match &self.arguments {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            arguments => arguments.clone(),
        };
        Ok(serde_json::from_value(arguments)?)
    }
}

pub struct ExporterContext {
    logger: slog::Logger,
    configuration: ExporterConfiguration,
    filter: Option<Arc<dyn RecordFilter>>,
}

impl ExporterContext {
    pub(crate) fn new(logger: slog::Logger, configuration: ExporterConfiguration) -> Self {
        ExporterContext {
            logger,
            configuration,
            filter: None,
        }
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn configuration(&self) -> &ExporterConfiguration {
        &self.configuration
    }

    /// Only records the filter accepts reach this exporter. The others still count as exported.
    pub fn set_filter(&mut self, filter: impl RecordFilter + 'static) {
        self.filter = Some(Arc::new(filter));
    }

    pub(crate) fn into_parts(self) -> (slog::Logger, Option<Arc<dyn RecordFilter>>) {
        (self.logger, self.filter)
    }
}

/// Per-exporter record selection. Everything is accepted by default.
pub trait RecordFilter: Send + Sync {
    fn accept_type(&self, _record_type: RecordType) -> bool {
        true
    }

    fn accept_value_type(&self, _value_type: ValueType) -> bool {
        true
    }

    fn accept_intent(&self, _intent: Intent) -> bool {
        true
    }
}

pub(crate) fn accepts(filter: &dyn RecordFilter, record: &ExportedRecord) -> bool {
    filter.accept_type(record.record_type)
        && filter.accept_value_type(record.value_type)
        && filter.accept_intent(record.intent)
}

/// Director wide filter, applied before a log entry is even mapped. Rejected entries are skipped
/// for every exporter.
pub trait EventFilter: Send + Sync {
    fn applies(&self, event: &LoggedEvent) -> bool;
}

/// Skips the entries at the given positions.
#[derive(Debug, Clone, Default)]
pub struct SkipPositionsFilter {
    positions: HashSet<i64>,
}

impl SkipPositionsFilter {
    pub fn new(positions: impl IntoIterator<Item = i64>) -> Self {
        SkipPositionsFilter {
            positions: positions.into_iter().collect(),
        }
    }
}

impl EventFilter for SkipPositionsFilter {
    fn applies(&self, event: &LoggedEvent) -> bool {
        !self.positions.contains(&event.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Debug, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct ElasticConfig {
        url: String,
        #[serde(default)]
        bulk_size: u32,
    }

    #[test]
    fn instantiate_typed_configuration() {
        let configuration = ExporterConfiguration::new("elastic", json!({"url": "http://localhost:9200", "bulkSize": 50}));
        let config: ElasticConfig = configuration.instantiate().unwrap();
        assert_eq!(
            config,
            ElasticConfig {
                url: "http://localhost:9200".to_string(),
                bulk_size: 50
            }
        );

        let configuration = ExporterConfiguration::new("elastic", json!({"bulkSize": "many"}));
        assert!(matches!(
            configuration.instantiate::<ElasticConfig>(),
            Err(ExporterError::Configuration(_))
        ));
    }

    #[test]
    fn skip_positions() {
        let filter = SkipPositionsFilter::new(vec![2, 4]);
        let mut event = LoggedEvent::new(
            crate::logstream::RecordMetadata::event(ValueType::Job, 0),
            bytes::Bytes::new(),
        );

        event.position = 2;
        assert!(!filter.applies(&event));
        event.position = 3;
        assert!(filter.applies(&event));
    }
}
