use crate::db::{
    journal::{Journal, Snapshot, SnapshotError},
    SnapshotStore,
};
use alloy::primitives::{
    map::{HashMap, HashSet},
    Address, U256,
};
use revm::{database::EmptyDB, DatabaseRef};

type SlotKey = (Address, U256);

#[derive(Debug)]
enum StorageChange {
    /// A slot was written. `previous` is `None` if it had not been written.
    Slot { key: SlotKey, previous: Option<U256> },
    /// The original value of a slot was recorded or moved.
    Original { key: SlotKey, previous: Option<U256> },
    /// An account's storage was cleared.
    Cleared { address: Address, was_cleared: bool },
}

/// Per-account contract storage with snapshot and restore.
///
/// Besides the current value of every slot, the store tracks each slot's
/// _original_ value: its value at the last _floor_. The floor starts at the
/// backing database, and is moved up to the current values by
/// [`StorageStore::advance_floor`] or [`StorageStore::take_floor_snapshot`].
/// Moving it between transactions makes each transaction see the previous
/// one's writes as its originals, while an outer snapshot can still roll
/// everything back.
#[derive(Debug)]
pub struct StorageStore<Db = EmptyDB> {
    db: Db,
    slots: HashMap<SlotKey, U256>,
    originals: HashMap<SlotKey, U256>,
    cleared: HashSet<Address>,
    /// Slots whose value or original may have changed since the last floor.
    dirty: HashSet<SlotKey>,
    journal: Journal<StorageChange>,
}

impl Default for StorageStore {
    fn default() -> Self {
        Self::new(EmptyDB::default())
    }
}

impl<Db> StorageStore<Db> {
    /// Create a new store over the given backing database.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            slots: Default::default(),
            originals: Default::default(),
            cleared: Default::default(),
            dirty: Default::default(),
            journal: Default::default(),
        }
    }

    /// Get a reference to the backing database.
    pub const fn db(&self) -> &Db {
        &self.db
    }

    /// Number of outstanding snapshots.
    pub fn snapshot_depth(&self) -> usize {
        self.journal.depth()
    }

    /// Move the original-value floor up to the current values.
    ///
    /// Only slots touched since the last floor are visited. Restoring a
    /// snapshot taken before the move undoes it along with the writes.
    pub fn advance_floor(&mut self) {
        for key in core::mem::take(&mut self.dirty) {
            let previous = match self.slots.get(&key) {
                Some(value) => self.originals.insert(key, *value),
                // not overlaid: the current value is read through, so is the
                // original
                None => self.originals.remove(&key),
            };
            if previous != self.originals.get(&key).copied() {
                self.journal.record(StorageChange::Original { key, previous });
            }
        }
    }

    /// Move the original-value floor up to the current values, then take a
    /// snapshot.
    pub fn take_floor_snapshot(&mut self) -> Snapshot {
        self.advance_floor();
        self.journal.checkpoint()
    }

    fn write_slot(&mut self, key: SlotKey, value: U256) {
        let previous = self.slots.insert(key, value);
        self.dirty.insert(key);
        self.journal.record(StorageChange::Slot { key, previous });
    }

    fn record_original(&mut self, key: SlotKey, value: U256) {
        if !self.originals.contains_key(&key) {
            self.originals.insert(key, value);
            self.journal.record(StorageChange::Original { key, previous: None });
        }
    }
}

impl<Db: DatabaseRef> StorageStore<Db> {
    /// Get the current value of a slot.
    pub fn get(&self, address: Address, slot: U256) -> Result<U256, Db::Error> {
        if let Some(value) = self.slots.get(&(address, slot)) {
            return Ok(*value);
        }
        if self.cleared.contains(&address) {
            return Ok(U256::ZERO);
        }
        self.db.storage_ref(address, slot)
    }

    /// Get the value the slot held at the last floor.
    pub fn original_value(&self, address: Address, slot: U256) -> Result<U256, Db::Error> {
        match self.originals.get(&(address, slot)) {
            Some(value) => Ok(*value),
            None => self.get(address, slot),
        }
    }

    /// Write a slot, returning the previous value.
    pub fn set(&mut self, address: Address, slot: U256, value: U256) -> Result<U256, Db::Error> {
        let key = (address, slot);
        let current = self.get(address, slot)?;
        self.record_original(key, current);
        self.write_slot(key, value);
        Ok(current)
    }

    /// Clear all storage of an account, e.g. when it is destroyed or
    /// re-created.
    pub fn clear(&mut self, address: Address) -> Result<(), Db::Error> {
        let keys: Vec<SlotKey> =
            self.slots.keys().filter(|(owner, _)| *owner == address).copied().collect();
        for key in keys {
            let current = self.get(key.0, key.1)?;
            self.record_original(key, current);
            self.dirty.insert(key);
            if let Some(previous) = self.slots.remove(&key) {
                self.journal.record(StorageChange::Slot { key, previous: Some(previous) });
            }
        }
        let was_cleared = !self.cleared.insert(address);
        self.journal.record(StorageChange::Cleared { address, was_cleared });
        Ok(())
    }
}

impl<Db> SnapshotStore for StorageStore<Db> {
    fn take_snapshot(&mut self) -> Snapshot {
        self.journal.checkpoint()
    }

    fn restore(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        for change in self.journal.revert(snapshot)?.rev() {
            if let StorageChange::Slot { key, .. } | StorageChange::Original { key, .. } = &change {
                self.dirty.insert(*key);
            }
            match change {
                StorageChange::Slot { key, previous: Some(value) } => {
                    self.slots.insert(key, value);
                }
                StorageChange::Slot { key, previous: None } => {
                    self.slots.remove(&key);
                }
                StorageChange::Original { key, previous: Some(value) } => {
                    self.originals.insert(key, value);
                }
                StorageChange::Original { key, previous: None } => {
                    self.originals.remove(&key);
                }
                StorageChange::Cleared { address, was_cleared } => {
                    if !was_cleared {
                        self.cleared.remove(&address);
                    }
                }
            }
        }
        Ok(())
    }

    fn release(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        self.journal.release(snapshot)
    }

    fn commit(&mut self) {
        self.originals.clear();
        self.dirty.clear();
        self.journal.clear();
    }
}
