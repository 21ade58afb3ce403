use crate::logstream::{
    CommitListener, CommitListenerId, LogStream, LogStreamError, LogStreamReader, LoggedEvent,
};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// Entries are kept as decoded structs. Anything crossing the wire goes through
// `LoggedEvent::encode` on the replication path instead.
struct Inner {
    partition_id: u16,
    entries: Mutex<Vec<LoggedEvent>>,
    commit_position: AtomicI64,
    listeners: Mutex<Vec<(CommitListenerId, Arc<dyn CommitListener>)>>,
    next_listener_id: AtomicU64,
}

/// Log stream held entirely in memory. Clones share the same log.
#[derive(Clone)]
pub struct InMemoryLogStream {
    inner: Arc<Inner>,
}

impl InMemoryLogStream {
    pub fn new(partition_id: u16) -> Self {
        InMemoryLogStream {
            inner: Arc::new(Inner {
                partition_id,
                entries: Mutex::new(Vec::new()),
                commit_position: AtomicI64::new(-1),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn shared(partition_id: u16) -> Arc<dyn LogStream> {
        Arc::new(Self::new(partition_id))
    }
}

impl Inner {
    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<LoggedEvent>> {
        self.entries.lock().expect("InMemoryLogStream entries mutex guard poison")
    }

    fn read(&self, position: i64) -> Option<LoggedEvent> {
        // Log API states that positions start from 1.
        if position < 1 {
            return None;
        }
        self.entries().get((position - 1) as usize).cloned()
    }

    fn contains(&self, position: i64) -> bool {
        position >= 1 && (position as usize) <= self.entries().len()
    }
}

impl LogStream for InMemoryLogStream {
    fn partition_id(&self) -> u16 {
        self.inner.partition_id
    }

    fn next_position(&self) -> i64 {
        self.inner.entries().len() as i64 + 1
    }

    fn append(&self, event: LoggedEvent) -> Result<i64, LogStreamError> {
        let mut entries = self.inner.entries();
        let expected = entries.len() as i64 + 1;
        if event.position != expected {
            return Err(LogStreamError::NonContiguousAppend {
                expected,
                actual: event.position,
            });
        }

        entries.push(event);
        Ok(expected)
    }

    fn read(&self, position: i64) -> Option<LoggedEvent> {
        self.inner.read(position)
    }

    fn truncate(&self, position: i64) -> Result<(), LogStreamError> {
        let commit_position = self.commit_position();
        if position <= commit_position {
            return Err(LogStreamError::TruncateCommitted {
                position,
                commit_position,
            });
        }

        let keep = (position.max(1) - 1) as usize;
        self.inner.entries().truncate(keep);
        Ok(())
    }

    fn last_entry(&self) -> Option<(i32, i64)> {
        let entries = self.inner.entries();
        entries.last().map(|e| (e.raft_term, entries.len() as i64))
    }

    fn commit_position(&self) -> i64 {
        self.inner.commit_position.load(Ordering::Acquire)
    }

    fn set_commit_position(&self, position: i64) {
        let previous = self.inner.commit_position.fetch_max(position, Ordering::AcqRel);
        if position <= previous {
            return;
        }

        // Call out without holding the lock; a listener may well (un)register.
        let listeners: Vec<_> = self
            .inner
            .listeners
            .lock()
            .expect("InMemoryLogStream listeners mutex guard poison")
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener.on_commit(position);
        }
    }

    fn register_commit_listener(&self, listener: Arc<dyn CommitListener>) -> CommitListenerId {
        let id = CommitListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .expect("InMemoryLogStream listeners mutex guard poison")
            .push((id, listener));
        id
    }

    fn unregister_commit_listener(&self, id: CommitListenerId) {
        self.inner
            .listeners
            .lock()
            .expect("InMemoryLogStream listeners mutex guard poison")
            .retain(|(registered, _)| *registered != id);
    }

    fn new_reader(&self) -> Box<dyn LogStreamReader> {
        Box::new(InMemoryLogStreamReader {
            inner: self.inner.clone(),
            next_position: 1,
            closed: false,
        })
    }
}

struct InMemoryLogStreamReader {
    inner: Arc<Inner>,
    next_position: i64,
    closed: bool,
}

impl LogStreamReader for InMemoryLogStreamReader {
    fn seek_to_position_after(&mut self, position: i64) -> bool {
        if position < 0 {
            self.next_position = 1;
            return true;
        }
        if !self.inner.contains(position) {
            return false;
        }

        self.next_position = position + 1;
        true
    }

    fn has_next(&mut self) -> bool {
        !self.closed
            && self.next_position <= self.inner.commit_position.load(Ordering::Acquire)
            && self.inner.contains(self.next_position)
    }

    fn next(&mut self) -> Option<LoggedEvent> {
        if !self.has_next() {
            return None;
        }

        let event = self.inner.read(self.next_position)?;
        self.next_position += 1;
        Some(event)
    }

    fn position(&self) -> i64 {
        self.next_position
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
