use crate::{
    db::{Ledger, Snapshot, SnapshotStore},
    BuildError, ReceiptsTracer, Transaction,
};
use alloy::primitives::B256;

/// Consecutive candidates sharing a bundle hash, waiting to be executed as a
/// unit.
#[derive(Debug, Default)]
pub(crate) struct BundleRun {
    bundle_hash: Option<B256>,
    members: Vec<Transaction>,
}

impl BundleRun {
    /// The bundle hash of the run, `None` if no run is in progress.
    pub(crate) const fn bundle_hash(&self) -> Option<B256> {
        self.bundle_hash
    }

    /// True if a transaction with the same hash is already in the run.
    pub(crate) fn contains(&self, tx: &Transaction) -> bool {
        self.members.iter().any(|member| member.hash() == tx.hash())
    }

    /// Append a bundle member. Starts a new run if none is in progress.
    pub(crate) fn push(&mut self, tx: Transaction) {
        debug_assert!(self.bundle_hash.is_none() || self.bundle_hash == tx.bundle_hash());
        self.bundle_hash = self.bundle_hash.or(tx.bundle_hash());
        self.members.push(tx);
    }

    /// Take the run, leaving no run in progress.
    pub(crate) fn take(&mut self) -> Option<(B256, Vec<Transaction>)> {
        let bundle_hash = self.bundle_hash.take()?;
        Some((bundle_hash, core::mem::take(&mut self.members)))
    }
}

/// Snapshots of the three rollback resources, taken together before a
/// bundle executes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BundleCheckpoint {
    state: Snapshot,
    storage: Snapshot,
    receipts: usize,
}

impl BundleCheckpoint {
    /// Snapshot the ledger stores and the tracer.
    pub(crate) fn take<Db>(ledger: &mut Ledger<Db>, tracer: &ReceiptsTracer) -> Self {
        Self {
            state: ledger.state.take_snapshot(),
            storage: ledger.storage.take_snapshot(),
            receipts: tracer.take_snapshot(),
        }
    }

    /// Roll all three resources back to the checkpoint.
    pub(crate) fn restore<Db, E>(
        self,
        ledger: &mut Ledger<Db>,
        tracer: &mut ReceiptsTracer,
    ) -> Result<(), BuildError<E>> {
        ledger.state.restore(self.state)?;
        ledger.storage.restore(self.storage)?;
        tracer.restore_snapshot(self.receipts)?;
        Ok(())
    }

    /// Keep everything done since the checkpoint, and stop tracking it. The
    /// receipts need no release, as their snapshot is a plain count.
    pub(crate) fn release<Db, E>(self, ledger: &mut Ledger<Db>) -> Result<(), BuildError<E>> {
        ledger.state.release(self.state)?;
        ledger.storage.release(self.storage)?;
        Ok(())
    }
}
