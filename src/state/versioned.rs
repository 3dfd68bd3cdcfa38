use super::snapshots::{HistoryError, Snapshot, SnapshotStore};
use crate::config::Tunables;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Undo/redo availability, emitted after every mutating operation so UI
/// controls can enable/disable without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone)]
struct PendingCommit {
    value: String,
    due: Instant,
}

/// Versioned document buffer over a `SnapshotStore`.
///
/// Live typing goes through the debounced path: each write replaces the
/// single pending commit and pushes its deadline out, so only the last
/// value of a quiet period lands in history. Explicit actions (paste, AI
/// insertion, restore) commit synchronously and drop any pending commit
/// first, so the two paths can never interleave.
pub struct VersionedBuffer {
    store: SnapshotStore,
    pending: Option<PendingCommit>,
    debounce: Duration,
    status_tx: Option<mpsc::UnboundedSender<HistoryStatus>>,
}

impl VersionedBuffer {
    pub fn new(initial: impl Into<String>, tunables: &Tunables) -> Self {
        Self {
            store: SnapshotStore::new(initial, tunables.history_cap),
            pending: None,
            debounce: tunables.debounce,
            status_tx: None,
        }
    }

    /// Registers the channel that receives a `HistoryStatus` after every
    /// mutating operation.
    pub fn set_status_notifier(&mut self, tx: mpsc::UnboundedSender<HistoryStatus>) {
        self.status_tx = Some(tx);
    }

    pub fn read(&self) -> &str {
        &self.store.current().value
    }

    pub fn write(&mut self, value: impl Into<String>, debounce: bool) {
        let value = value.into();
        if debounce {
            self.pending = Some(PendingCommit {
                value,
                due: Instant::now() + self.debounce,
            });
        } else {
            self.pending = None;
            self.commit(value);
        }
    }

    /// Applies the pending debounced commit once its deadline has passed.
    /// Returns whether a commit ran. The driver calls this from its timer
    /// arm; tests pass explicit instants.
    pub fn poll_commit(&mut self, now: Instant) -> bool {
        let due = match &self.pending {
            Some(pending) => pending.due <= now,
            None => false,
        };
        if !due {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            self.commit(pending.value);
        }
        true
    }

    /// Commits the pending debounced value immediately, regardless of its
    /// deadline. Navigation uses this so paused typing is never lost.
    pub fn flush_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                self.commit(pending.value);
                true
            }
            None => false,
        }
    }

    pub fn commit_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.due)
    }

    pub fn undo(&mut self) -> bool {
        self.flush_pending();
        if !self.store.can_undo() {
            return false;
        }
        let target = self.store.cursor() - 1;
        if self.store.move_to(target).is_err() {
            return false;
        }
        self.emit_status();
        true
    }

    pub fn redo(&mut self) -> bool {
        self.flush_pending();
        if !self.store.can_redo() {
            return false;
        }
        let target = self.store.cursor() + 1;
        if self.store.move_to(target).is_err() {
            return false;
        }
        self.emit_status();
        true
    }

    /// Explicit jump to a prior version from a history view.
    pub fn restore(&mut self, index: usize) -> Result<(), HistoryError> {
        self.flush_pending();
        self.store.move_to(index)?;
        self.emit_status();
        Ok(())
    }

    pub fn reset(&mut self, initial: impl Into<String>) {
        self.pending = None;
        self.store.reinit(initial);
        self.emit_status();
    }

    /// Owned copy of the history for display; not live-bound.
    pub fn history(&self) -> Vec<Snapshot> {
        self.store.entries().to_vec()
    }

    pub fn cursor(&self) -> usize {
        self.store.cursor()
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            can_undo: self.store.can_undo(),
            can_redo: self.store.can_redo(),
        }
    }

    fn commit(&mut self, value: String) {
        if self.store.append(value) {
            self.emit_status();
        }
    }

    fn emit_status(&self) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(self.status());
        }
    }
}
