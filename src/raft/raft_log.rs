use crate::logstream::{LogStream, LogStreamError, LoggedEvent};
use crate::raft::local_state::Term;
use std::sync::Arc;

/// RaftLog is the raft-specific facade over a partition's log stream.
///
/// Note: A log entry has 2 states here (not modeled directly in code):
/// 1. Appended - written locally, not yet replicated to a quorum
/// 2. Committed - replicated to a quorum; the log stream exposes it to readers
///
/// A log entry's state has no global truth. Each member has its own view of it.
pub(crate) struct RaftLog {
    logger: slog::Logger,
    log: Arc<dyn LogStream>,
}

impl RaftLog {
    pub(crate) fn new(logger: slog::Logger, log: Arc<dyn LogStream>) -> Self {
        RaftLog { logger, log }
    }

    /// `(term, position)` of our log tail. An empty log reads as `(0, -1)`, which sorts below
    /// every real entry since entries are only written in terms >= 1.
    pub(crate) fn latest_entry(&self) -> (Term, i64) {
        self.log
            .last_entry()
            .map(|(term, position)| (Term::new(term), position))
            .unwrap_or((Term::new(0), -1))
    }

    pub(crate) fn next_position(&self) -> i64 {
        self.log.next_position()
    }

    pub(crate) fn term_at(&self, position: i64) -> Option<Term> {
        self.log.read(position).map(|e| Term::new(e.raft_term))
    }

    pub(crate) fn read(&self, position: i64) -> Option<LoggedEvent> {
        self.log.read(position)
    }

    /// Remove anything starting at `position` and later.
    pub(crate) fn truncate(&mut self, position: i64) -> Result<(), LogStreamError> {
        slog::info!(self.logger, "Truncating log from position {}", position);
        self.log.truncate(position)
    }

    pub(crate) fn append(&mut self, event: LoggedEvent) -> Result<i64, LogStreamError> {
        self.log.append(event)
    }

    pub(crate) fn commit_position(&self) -> i64 {
        self.log.commit_position()
    }

    /// Advances the commit position if `new_commit_position` is ahead of it. Never moves it back.
    pub(crate) fn ratchet_fwd_commit_position(&mut self, new_commit_position: i64) {
        let current = self.commit_position();
        if new_commit_position <= current {
            return;
        }

        // Only mark as committed what we have locally.
        let (_, latest_position) = self.latest_entry();
        let new_commit_position = new_commit_position.min(latest_position);
        if new_commit_position <= current {
            return;
        }

        slog::debug!(
            self.logger,
            "Commit position {} -> {}",
            current,
            new_commit_position
        );
        self.log.set_commit_position(new_commit_position);
    }
}
