use crate::exporter::api::{Exporter, ExporterConfiguration};
use std::fmt;
use std::sync::Arc;

pub type ExporterFactory = Arc<dyn Fn() -> Box<dyn Exporter> + Send + Sync>;

/// How to build one configured exporter. A fresh instance is created every time a director starts.
#[derive(Clone)]
pub struct ExporterDescriptor {
    configuration: ExporterConfiguration,
    factory: ExporterFactory,
}

impl ExporterDescriptor {
    pub fn new<F>(id: impl Into<String>, arguments: serde_json::Value, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Exporter> + Send + Sync + 'static,
    {
        ExporterDescriptor {
            configuration: ExporterConfiguration::new(id, arguments),
            factory: Arc::new(factory),
        }
    }

    pub fn id(&self) -> &str {
        self.configuration.id()
    }

    pub fn configuration(&self) -> &ExporterConfiguration {
        &self.configuration
    }

    pub(crate) fn create(&self) -> Box<dyn Exporter> {
        (self.factory)()
    }
}

impl fmt::Debug for ExporterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExporterDescriptor({})", self.id())
    }
}
