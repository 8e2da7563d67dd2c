use core::fmt;

/// Handle to a point in the history of a [`SnapshotStore`].
///
/// Handles follow a strict stack discipline. Restoring a handle consumes it,
/// along with every handle taken after it. Committing the store invalidates
/// all handles.
///
/// [`SnapshotStore`]: crate::db::SnapshotStore
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snapshot(u64);

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors from misuse of snapshot handles. These indicate a logic bug in the
/// caller, and are not recoverable.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    /// The handle is unknown, was already restored, was discarded by
    /// restoring an older handle, or was invalidated by a commit.
    #[error("snapshot {0} is not outstanding")]
    NotOutstanding(Snapshot),
}

/// Undo log shared by the snapshot stores.
///
/// Entries are only recorded while at least one snapshot is outstanding, as
/// nothing could roll them back otherwise.
#[derive(Debug)]
pub(crate) struct Journal<E> {
    entries: Vec<E>,
    checkpoints: Vec<(Snapshot, usize)>,
    next_id: u64,
}

impl<E> Default for Journal<E> {
    fn default() -> Self {
        Self { entries: Vec::new(), checkpoints: Vec::new(), next_id: 0 }
    }
}

impl<E> Journal<E> {
    /// Record an undo entry.
    pub(crate) fn record(&mut self, entry: E) {
        if !self.checkpoints.is_empty() {
            self.entries.push(entry);
        }
    }

    /// Open a new checkpoint at the current position.
    pub(crate) fn checkpoint(&mut self) -> Snapshot {
        let snapshot = Snapshot(self.next_id);
        self.next_id += 1;
        self.checkpoints.push((snapshot, self.entries.len()));
        snapshot
    }

    /// Pop the checkpoint and everything above it, returning the entries
    /// recorded since. Callers must undo them in reverse order.
    pub(crate) fn revert(
        &mut self,
        snapshot: Snapshot,
    ) -> Result<std::vec::Drain<'_, E>, SnapshotError> {
        let idx = self
            .checkpoints
            .iter()
            .rposition(|(id, _)| *id == snapshot)
            .ok_or(SnapshotError::NotOutstanding(snapshot))?;
        let (_, position) = self.checkpoints[idx];
        self.checkpoints.truncate(idx);
        Ok(self.entries.drain(position..))
    }

    /// Drop the checkpoint and everything above it, keeping the entries
    /// recorded since. They stay undoable by an outer checkpoint. Once no
    /// checkpoint is left, nothing can undo them and they are forgotten.
    pub(crate) fn release(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let idx = self
            .checkpoints
            .iter()
            .rposition(|(id, _)| *id == snapshot)
            .ok_or(SnapshotError::NotOutstanding(snapshot))?;
        self.checkpoints.truncate(idx);
        if self.checkpoints.is_empty() {
            self.entries.clear();
        }
        Ok(())
    }

    /// Number of recorded undo entries.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Forget all entries and checkpoints.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.checkpoints.clear();
    }

    /// Number of outstanding checkpoints.
    pub(crate) fn depth(&self) -> usize {
        self.checkpoints.len()
    }
}
