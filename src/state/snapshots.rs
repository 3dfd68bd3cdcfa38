use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },
}

/// One immutable document state. Snapshots are created and owned by a
/// `SnapshotStore` and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: u64,
    pub value: String,
    pub created_at: Instant,
}

/// Bounded, linear history: an ordered arena of snapshots plus a cursor.
/// Entries past the cursor are the redo branch and are discarded whole on
/// the next append. The store always holds at least one entry.
#[derive(Debug)]
pub struct SnapshotStore {
    entries: Vec<Snapshot>,
    cursor: usize,
    capacity: usize,
    next_id: u64,
}

impl SnapshotStore {
    pub fn new(initial: impl Into<String>, capacity: usize) -> Self {
        let mut store = Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
            next_id: 0,
        };
        store.push_snapshot(initial.into());
        store
    }

    /// Appends a new snapshot, pruning the redo branch first. Appending the
    /// value already at the cursor is a no-op. Returns whether an entry was
    /// actually created.
    pub fn append(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.entries[self.cursor].value == value {
            return false;
        }

        self.entries.truncate(self.cursor + 1);
        self.push_snapshot(value);

        if self.entries.len() > self.capacity {
            self.entries.remove(0);
            self.cursor -= 1;
        }

        true
    }

    pub fn move_to(&mut self, index: usize) -> Result<(), HistoryError> {
        if index >= self.entries.len() {
            return Err(HistoryError::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.cursor = index;
        Ok(())
    }

    pub fn current(&self) -> &Snapshot {
        &self.entries[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len() - 1
    }

    pub fn entries(&self) -> &[Snapshot] {
        &self.entries
    }

    /// Drops all history and restarts from a single entry. Snapshot ids
    /// keep increasing across resets.
    pub fn reinit(&mut self, initial: impl Into<String>) {
        self.entries.clear();
        self.cursor = 0;
        self.push_snapshot(initial.into());
    }

    fn push_snapshot(&mut self, value: String) {
        let snapshot = Snapshot {
            id: self.next_id,
            value,
            created_at: Instant::now(),
        };
        self.next_id += 1;
        self.entries.push(snapshot);
        self.cursor = self.entries.len() - 1;
    }
}
