//! Ledger state with snapshot and restore.
//!
//! The ledger is split in two independently snapshotted stores, mirroring
//! how block execution uses them:
//!
//! - [`StateStore`] holds accounts: balance, nonce, code and existence.
//! - [`StorageStore`] holds contract storage, keyed by account and slot.
//!
//! Both are overlays over a read-only backing [`DatabaseRef`], and implement
//! [`SnapshotStore`]. The pair is grouped as a [`Ledger`], which can be
//! handed to revm through [`Ledger::view`].

mod journal;
pub use journal::{Snapshot, SnapshotError};

mod state;
pub use state::StateStore;

mod storage;
pub use storage::StorageStore;

use alloy::primitives::{Address, B256, U256};
use revm::{
    bytecode::Bytecode,
    database::EmptyDB,
    state::{AccountInfo, EvmState},
    Database, DatabaseRef,
};

/// A store whose pending mutations can be checkpointed and rolled back.
pub trait SnapshotStore {
    /// Take a snapshot of the current state.
    fn take_snapshot(&mut self) -> Snapshot;

    /// Discard every mutation made after the snapshot was taken.
    ///
    /// The snapshot, and every snapshot taken after it, is consumed. Using a
    /// handle that is not outstanding is an error.
    fn restore(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError>;

    /// Keep every mutation made after the snapshot was taken, and drop the
    /// snapshot along with every snapshot taken after it.
    ///
    /// Mutations stay undoable by snapshots taken before this one. Once no
    /// snapshot is outstanding, the store stops paying for rollback.
    fn release(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError>;

    /// Make all pending mutations durable. Invalidates every outstanding
    /// snapshot.
    fn commit(&mut self);
}

/// Account state and contract storage over a shared backing database.
#[derive(Debug)]
pub struct Ledger<Db = EmptyDB> {
    /// Account state.
    pub state: StateStore<Db>,
    /// Contract storage.
    pub storage: StorageStore<Db>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(EmptyDB::default())
    }
}

impl<Db: Clone> Ledger<Db> {
    /// Create a new ledger over the backing database. Use a reference or an
    /// [`Arc`] to share a large database between the two stores.
    ///
    /// [`Arc`]: std::sync::Arc
    pub fn new(db: Db) -> Self {
        Self { state: StateStore::new(db.clone()), storage: StorageStore::new(db) }
    }
}

impl<Db: DatabaseRef> Ledger<Db> {
    /// A [`Database`] view of the ledger, for use with revm.
    pub const fn view(&self) -> LedgerView<'_, Db> {
        LedgerView { ledger: self }
    }

    /// Apply the state changes produced by revm.
    pub fn apply_evm_state(&mut self, changes: EvmState) -> Result<(), Db::Error> {
        for (address, account) in changes {
            if !account.is_touched() {
                continue;
            }

            if account.is_selfdestructed() {
                self.state.remove_account(address);
                self.storage.clear(address)?;
                continue;
            }

            if account.is_created() {
                self.storage.clear(address)?;
            }
            self.state.insert_account(address, account.info);

            for (slot, value) in account.storage {
                if value.is_changed() {
                    self.storage.set(address, slot, value.present_value())?;
                }
            }
        }
        Ok(())
    }
}

/// Read-only [`Database`] adapter over a [`Ledger`].
#[derive(Debug)]
pub struct LedgerView<'a, Db> {
    ledger: &'a Ledger<Db>,
}

impl<Db: DatabaseRef> Database for LedgerView<'_, Db> {
    type Error = Db::Error;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        self.ledger.state.account(address)
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        self.ledger.state.code_by_hash(code_hash)
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        self.ledger.storage.get(address, index)
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        self.ledger.state.db().block_hash_ref(number)
    }
}
