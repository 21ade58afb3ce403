use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Export counters of one partition. Written by the director, readable from anywhere.
#[derive(Debug)]
pub struct ExporterMetrics {
    exported: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    last_exported_position: AtomicI64,
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        ExporterMetrics {
            exported: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_exported_position: AtomicI64::new(-1),
        }
    }
}

impl ExporterMetrics {
    /// Records that went through every exporter.
    pub fn exported_events(&self) -> u64 {
        self.exported.load(Ordering::Relaxed)
    }

    /// Records no exporter was handed, because of the event filter or a value type without mapping.
    pub fn skipped_events(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Failed `export` calls, counting every retry.
    pub fn failed_exports(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn last_exported_position(&self) -> i64 {
        self.last_exported_position.load(Ordering::Relaxed)
    }

    pub(crate) fn event_exported(&self, position: i64) {
        self.exported.fetch_add(1, Ordering::Relaxed);
        self.last_exported_position.store(position, Ordering::Relaxed);
    }

    pub(crate) fn event_skipped(&self, position: i64) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.last_exported_position.store(position, Ordering::Relaxed);
    }

    pub(crate) fn export_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}
