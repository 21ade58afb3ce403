use rocksdb::{IteratorMode, MergeOperands, Options, DB};
use std::convert::TryInto;
use std::sync::Arc;
use thiserror::Error;

/// Stored position of an exporter that has not acknowledged anything yet.
pub const POSITION_NONE: i64 = -1;

const MAX_MERGE_OPERATOR: &str = "max";

#[derive(Error, Debug)]
pub enum StateError {
    #[error("position store I/O failed")]
    Store(#[from] rocksdb::Error),

    #[error("stored position of exporter '{exporter_id}' is {length} bytes, expected 8")]
    MalformedPosition { exporter_id: String, length: usize },

    #[error("stored exporter id is not valid UTF-8")]
    MalformedExporterId(#[from] std::string::FromUtf8Error),
}

/// Last acknowledged log position of every exporter of a partition.
///
/// Layout: default column family, key is the exporter id as UTF-8, value is the position as an
/// 8-byte big-endian integer. Positions only move forward through `set_if_greater`, which relies on
/// the store's "max" merge operator.
///
/// Exactly one writer: the partition's exporter director. Snapshots read the store through
/// checkpoints, never through this type.
pub struct ExportersState {
    db: Arc<DB>,
}

impl ExportersState {
    pub fn new(db: Arc<DB>) -> Self {
        ExportersState { db }
    }

    /// Options every position store has to be opened with.
    pub fn db_options() -> Options {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.set_merge_operator_associative(MAX_MERGE_OPERATOR, merge_max_position);
        options
    }

    pub fn get(&self, exporter_id: &str) -> Result<i64, StateError> {
        match self.db.get(exporter_id.as_bytes())? {
            Some(value) => decode_position(exporter_id, &value),
            None => Ok(POSITION_NONE),
        }
    }

    pub fn set(&self, exporter_id: &str, position: i64) -> Result<(), StateError> {
        self.db.put(exporter_id.as_bytes(), position.to_be_bytes())?;
        Ok(())
    }

    pub fn set_if_greater(&self, exporter_id: &str, position: i64) -> Result<(), StateError> {
        self.db.merge(exporter_id.as_bytes(), position.to_be_bytes())?;
        Ok(())
    }

    pub fn remove(&self, exporter_id: &str) -> Result<(), StateError> {
        self.db.delete(exporter_id.as_bytes())?;
        Ok(())
    }

    /// Visits every stored position in exporter id order.
    pub fn visit_positions<F>(&self, mut visitor: F) -> Result<(), StateError>
    where
        F: FnMut(&str, i64),
    {
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item?;
            let exporter_id = String::from_utf8(key.into_vec())?;
            let position = decode_position(&exporter_id, &value)?;
            visitor(&exporter_id, position);
        }

        Ok(())
    }

    pub fn exporter_ids(&self) -> Result<Vec<String>, StateError> {
        let mut ids = Vec::new();
        self.visit_positions(|id, _| ids.push(id.to_string()))?;
        Ok(ids)
    }

    /// Lowest position over all exporters, or `-1` if there are none. Reading the log right after
    /// it can't miss a record for any exporter.
    pub fn lowest_position(&self) -> Result<i64, StateError> {
        let mut lowest: Option<i64> = None;
        self.visit_positions(|_, position| {
            lowest = Some(lowest.map_or(position, |l| l.min(position)));
        })?;

        Ok(lowest.unwrap_or(POSITION_NONE))
    }
}

fn decode_position(exporter_id: &str, value: &[u8]) -> Result<i64, StateError> {
    let bytes: [u8; 8] = value.try_into().map_err(|_| StateError::MalformedPosition {
        exporter_id: exporter_id.to_string(),
        length: value.len(),
    })?;
    Ok(i64::from_be_bytes(bytes))
}

fn merge_max_position(_key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands) -> Option<Vec<u8>> {
    existing
        .into_iter()
        .chain(operands.iter())
        .filter_map(|value| value.try_into().ok().map(i64::from_be_bytes))
        .max()
        .map(|position| position.to_be_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_state(dir: &tempfile::TempDir) -> ExportersState {
        let db = DB::open(&ExportersState::db_options(), dir.path()).unwrap();
        ExportersState::new(Arc::new(db))
    }

    #[test]
    fn unknown_exporter_has_no_position() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_state(&dir);

        assert_eq!(state.get("elastic").unwrap(), POSITION_NONE);
        assert_eq!(state.lowest_position().unwrap(), POSITION_NONE);
    }

    #[test]
    fn set_if_greater_keeps_the_maximum() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_state(&dir);

        for position in [7, 3, 12, 9, 12, 1] {
            state.set_if_greater("elastic", position).unwrap();
        }
        assert_eq!(state.get("elastic").unwrap(), 12);

        // On top of a plain write too.
        state.set("elastic", 4).unwrap();
        state.set_if_greater("elastic", 2).unwrap();
        assert_eq!(state.get("elastic").unwrap(), 4);
    }

    #[test]
    fn lowest_position_over_all_exporters() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_state(&dir);

        state.set("a", 10).unwrap();
        state.set("b", 25).unwrap();
        state.set("c", 5).unwrap();
        assert_eq!(state.lowest_position().unwrap(), 5);

        state.remove("c").unwrap();
        assert_eq!(state.lowest_position().unwrap(), 10);
        assert_eq!(state.exporter_ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn visit_in_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_state(&dir);
        state.set("zeta", 1).unwrap();
        state.set("alpha", 2).unwrap();

        let mut visited = Vec::new();
        state
            .visit_positions(|id, position| visited.push((id.to_string(), position)))
            .unwrap();

        assert_eq!(visited, vec![("alpha".to_string(), 2), ("zeta".to_string(), 1)]);
    }
}
