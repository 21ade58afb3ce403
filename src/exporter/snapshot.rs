use crate::exporter::state::ExportersState;
use rocksdb::checkpoint::Checkpoint;
use rocksdb::DB;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const TMP_SUFFIX: &str = ".tmp";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot file system operation failed")]
    Io(#[from] io::Error),

    #[error("position store operation failed")]
    Store(#[from] rocksdb::Error),

    #[error("position store is not open")]
    NotOpen,
}

/// Owns the on-disk life of a partition's position store.
///
/// The live store sits in `runtime_dir`. Snapshots are RocksDB checkpoints in
/// `snapshots_dir/<position>`, where `<position>` is the last exported position when the snapshot
/// was taken. Recovery throws away the runtime directory and starts over from the newest
/// snapshot, so whatever was written after it is lost and gets exported again.
pub struct StateSnapshotController {
    logger: slog::Logger,
    runtime_dir: PathBuf,
    snapshots_dir: PathBuf,
    max_snapshots: usize,
    db: Mutex<Option<Arc<DB>>>,
}

impl StateSnapshotController {
    pub fn new(logger: slog::Logger, runtime_dir: PathBuf, snapshots_dir: PathBuf, max_snapshots: usize) -> Self {
        StateSnapshotController {
            logger,
            runtime_dir,
            snapshots_dir,
            max_snapshots: max_snapshots.max(1),
            db: Mutex::new(None),
        }
    }

    /// Replaces the runtime directory with a copy of the newest snapshot. Returns that snapshot's
    /// position, or `None` when there is no snapshot and the store starts empty.
    pub fn recover(&self) -> Result<Option<i64>, SnapshotError> {
        if self.runtime_dir.exists() {
            fs::remove_dir_all(&self.runtime_dir)?;
        }

        let latest = self.latest_snapshot_position()?;
        match latest {
            Some(position) => {
                copy_dir(&self.snapshot_dir(position), &self.runtime_dir)?;
                slog::info!(self.logger, "Recovered position store from snapshot {}", position);
            }
            None => {
                slog::info!(self.logger, "No snapshot to recover from, starting with an empty position store");
            }
        }

        Ok(latest)
    }

    pub fn open_store(&self) -> Result<Arc<DB>, SnapshotError> {
        let db = Arc::new(DB::open(&ExportersState::db_options(), &self.runtime_dir)?);
        self.db
            .lock()
            .expect("StateSnapshotController db mutex guard poison")
            .replace(db.clone());

        Ok(db)
    }

    /// Writes a checkpoint of the open store as the snapshot for `position`, replacing an existing
    /// one. Snapshots above `position` are dropped since they no longer reflect the store, then
    /// only the newest `max_snapshots` are kept.
    pub fn take_snapshot(&self, position: i64) -> Result<(), SnapshotError> {
        // Held for the whole snapshot, so it can't race `close()`.
        let guard = self.db.lock().expect("StateSnapshotController db mutex guard poison");
        let db = guard.as_ref().ok_or(SnapshotError::NotOpen)?;

        fs::create_dir_all(&self.snapshots_dir)?;
        let tmp_dir = self.snapshots_dir.join(format!("{}{}", position, TMP_SUFFIX));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        Checkpoint::new(db)?.create_checkpoint(&tmp_dir)?;

        let snapshot_dir = self.snapshot_dir(position);
        if snapshot_dir.exists() {
            fs::remove_dir_all(&snapshot_dir)?;
        }
        fs::rename(&tmp_dir, &snapshot_dir)?;
        slog::debug!(self.logger, "Took snapshot at position {}", position);

        self.prune_snapshots(position)
    }

    pub fn latest_snapshot_position(&self) -> Result<Option<i64>, SnapshotError> {
        Ok(self.snapshot_positions()?.into_iter().max())
    }

    /// Releases the controller's handle on the store. Any later snapshot attempt fails.
    pub fn close(&self) {
        if self
            .db
            .lock()
            .expect("StateSnapshotController db mutex guard poison")
            .take()
            .is_some()
        {
            slog::debug!(self.logger, "Closed position store");
        }
    }

    fn snapshot_dir(&self, position: i64) -> PathBuf {
        self.snapshots_dir.join(position.to_string())
    }

    fn snapshot_positions(&self) -> Result<Vec<i64>, SnapshotError> {
        if !self.snapshots_dir.exists() {
            return Ok(Vec::new());
        }

        let mut positions = Vec::new();
        for entry in fs::read_dir(&self.snapshots_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            // Skips leftovers of interrupted snapshots, which end in ".tmp".
            if let Some(position) = entry.file_name().to_str().and_then(|name| name.parse::<i64>().ok()) {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    fn prune_snapshots(&self, latest: i64) -> Result<(), SnapshotError> {
        let mut positions = self.snapshot_positions()?;
        positions.sort_unstable_by(|a, b| b.cmp(a));

        let stale = positions.iter().filter(|p| **p > latest);
        let surplus = positions.iter().filter(|p| **p <= latest).skip(self.max_snapshots);
        for position in stale.chain(surplus) {
            fs::remove_dir_all(self.snapshot_dir(*position))?;
            slog::debug!(self.logger, "Removed snapshot {}", position);
        }

        Ok(())
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::discard_logger;

    fn controller(dir: &tempfile::TempDir, max_snapshots: usize) -> StateSnapshotController {
        StateSnapshotController::new(
            discard_logger(),
            dir.path().join("runtime"),
            dir.path().join("snapshots"),
            max_snapshots,
        )
    }

    #[test]
    fn recover_restores_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = controller(&dir, 3);

        assert_eq!(snapshots.recover().unwrap(), None);
        let state = ExportersState::new(snapshots.open_store().unwrap());
        state.set("elastic", 3).unwrap();
        snapshots.take_snapshot(3).unwrap();
        state.set("elastic", 8).unwrap();
        snapshots.take_snapshot(8).unwrap();
        // Lost on recovery: not in any snapshot.
        state.set("elastic", 11).unwrap();
        snapshots.close();
        drop(state);

        let snapshots = controller(&dir, 3);
        assert_eq!(snapshots.recover().unwrap(), Some(8));
        let state = ExportersState::new(snapshots.open_store().unwrap());
        assert_eq!(state.get("elastic").unwrap(), 8);
    }

    #[test]
    fn keeps_only_newest_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = controller(&dir, 2);
        snapshots.recover().unwrap();
        let _db = snapshots.open_store().unwrap();

        for position in [1, 2, 3, 4] {
            snapshots.take_snapshot(position).unwrap();
        }

        let mut positions = snapshots.snapshot_positions().unwrap();
        positions.sort_unstable();
        assert_eq!(positions, vec![3, 4]);
    }

    #[test]
    fn lower_snapshot_supersedes_higher_ones() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = controller(&dir, 3);
        snapshots.recover().unwrap();
        let _db = snapshots.open_store().unwrap();

        snapshots.take_snapshot(10).unwrap();
        snapshots.take_snapshot(4).unwrap();

        assert_eq!(snapshots.latest_snapshot_position().unwrap(), Some(4));
    }

    #[test]
    fn snapshot_needs_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = controller(&dir, 3);

        assert!(matches!(snapshots.take_snapshot(1), Err(SnapshotError::NotOpen)));
    }
}
