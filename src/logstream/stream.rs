use crate::logstream::{LogStreamError, LoggedEvent};
use std::sync::Arc;

/// Woken whenever the commit position advances. Called on whichever thread advanced it, so
/// implementations should only hand the news over to their own task.
pub trait CommitListener: Send + Sync {
    fn on_commit(&self, commit_position: i64);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommitListenerId(pub(crate) u64);

/// The replicated log of one partition.
///
/// Positions start at 1 and are dense. `-1` is used throughout for "no position".
pub trait LogStream: Send + Sync {
    fn partition_id(&self) -> u16;

    /// Position the next appended entry must have.
    fn next_position(&self) -> i64;

    /// Appends an entry whose position is `next_position()`.
    fn append(&self, event: LoggedEvent) -> Result<i64, LogStreamError>;

    fn read(&self, position: i64) -> Option<LoggedEvent>;

    /// Removes `position` and everything after it. Committed entries can't be removed.
    fn truncate(&self, position: i64) -> Result<(), LogStreamError>;

    /// `(raft_term, position)` of the last entry, if any.
    fn last_entry(&self) -> Option<(i32, i64)>;

    fn commit_position(&self) -> i64;

    /// Only ever moves forward; lower values are ignored. Listeners fire when it moves.
    fn set_commit_position(&self, position: i64);

    fn register_commit_listener(&self, listener: Arc<dyn CommitListener>) -> CommitListenerId;

    fn unregister_commit_listener(&self, id: CommitListenerId);

    fn new_reader(&self) -> Box<dyn LogStreamReader>;
}

/// Cursor over the committed part of a log stream. Owned by exactly one consumer.
pub trait LogStreamReader: Send {
    /// Positions the reader right after `position`. A negative position means the start of the
    /// log. Returns false if the log has no entry at `position`, in which case the reader did not
    /// move.
    fn seek_to_position_after(&mut self, position: i64) -> bool;

    /// True if the entry at the cursor exists and is committed.
    fn has_next(&mut self) -> bool;

    fn next(&mut self) -> Option<LoggedEvent>;

    /// Position the next call to `next()` would return.
    fn position(&self) -> i64;

    fn close(&mut self);
}
