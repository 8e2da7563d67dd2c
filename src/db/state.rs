use crate::db::{
    journal::{Journal, Snapshot, SnapshotError},
    SnapshotStore,
};
use alloy::{
    consensus::constants::KECCAK_EMPTY,
    primitives::{map::HashMap, Address, B256, U256},
};
use revm::{bytecode::Bytecode, database::EmptyDB, state::AccountInfo, DatabaseRef};

/// Undo entry. `previous` is `None` if the account had not been written.
#[derive(Debug)]
struct AccountChange {
    address: Address,
    previous: Option<Option<AccountInfo>>,
}

/// Account-level ledger state with snapshot and restore.
///
/// Writes land in an overlay over a read-only backing database. Reads fall
/// through to the backing database for accounts that were never written.
/// Code is stored by hash, separately from the account info.
#[derive(Debug)]
pub struct StateStore<Db = EmptyDB> {
    db: Db,
    accounts: HashMap<Address, Option<AccountInfo>>,
    contracts: HashMap<B256, Bytecode>,
    journal: Journal<AccountChange>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(EmptyDB::default())
    }
}

impl<Db> StateStore<Db> {
    /// Create a new store over the given backing database.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            accounts: Default::default(),
            contracts: Default::default(),
            journal: Default::default(),
        }
    }

    /// Get a reference to the backing database.
    pub const fn db(&self) -> &Db {
        &self.db
    }

    /// Write an account, or delete it with `None`.
    pub fn set_account(&mut self, address: Address, info: Option<AccountInfo>) {
        let info = info.map(|mut info| {
            self.insert_contract(&mut info);
            info
        });
        let previous = self.accounts.insert(address, info);
        self.journal.record(AccountChange { address, previous });
    }

    /// Insert or overwrite an account.
    pub fn insert_account(&mut self, address: Address, info: AccountInfo) {
        self.set_account(address, Some(info));
    }

    /// Delete an account.
    pub fn remove_account(&mut self, address: Address) {
        self.set_account(address, None);
    }

    /// Number of outstanding snapshots.
    pub fn snapshot_depth(&self) -> usize {
        self.journal.depth()
    }

    /// Move the account's code into the contract map, keyed by code hash.
    fn insert_contract(&mut self, info: &mut AccountInfo) {
        if let Some(code) = info.code.take() {
            if !code.is_empty() {
                if info.code_hash == KECCAK_EMPTY || info.code_hash.is_zero() {
                    info.code_hash = code.hash_slow();
                }
                self.contracts.entry(info.code_hash).or_insert(code);
            }
        }
        if info.code_hash.is_zero() {
            info.code_hash = KECCAK_EMPTY;
        }
    }
}

impl<Db: DatabaseRef> StateStore<Db> {
    /// Get the account, or `None` if it does not exist.
    pub fn account(&self, address: Address) -> Result<Option<AccountInfo>, Db::Error> {
        match self.accounts.get(&address) {
            Some(info) => Ok(info.clone()),
            None => self.db.basic_ref(address),
        }
    }

    /// True if the account exists.
    pub fn exists(&self, address: Address) -> Result<bool, Db::Error> {
        self.account(address).map(|info| info.is_some())
    }

    /// Get the nonce of the account. Missing accounts have nonce 0.
    pub fn nonce(&self, address: Address) -> Result<u64, Db::Error> {
        self.account(address).map(|info| info.map(|info| info.nonce).unwrap_or_default())
    }

    /// Get the balance of the account. Missing accounts have balance 0.
    pub fn balance(&self, address: Address) -> Result<U256, Db::Error> {
        self.account(address).map(|info| info.map(|info| info.balance).unwrap_or_default())
    }

    /// Get code by its hash.
    pub fn code_by_hash(&self, code_hash: B256) -> Result<Bytecode, Db::Error> {
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytecode::default());
        }
        match self.contracts.get(&code_hash) {
            Some(code) => Ok(code.clone()),
            None => self.db.code_by_hash_ref(code_hash),
        }
    }

    /// Modify an account with the provided closure, creating it if it does
    /// not exist. Returns the original account info.
    pub fn modify_account<F>(&mut self, address: Address, f: F) -> Result<AccountInfo, Db::Error>
    where
        F: FnOnce(&mut AccountInfo),
    {
        let original = self.account(address)?.unwrap_or_default();
        let mut info = original.clone();
        f(&mut info);
        self.insert_account(address, info);
        Ok(original)
    }

    /// Set the nonce of an account, returning the previous nonce.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<u64, Db::Error> {
        self.modify_account(address, |info| info.nonce = nonce).map(|info| info.nonce)
    }

    /// Increment the nonce of an account, returning the previous nonce.
    pub fn increment_nonce(&mut self, address: Address) -> Result<u64, Db::Error> {
        self.modify_account(address, |info| info.nonce = info.nonce.saturating_add(1))
            .map(|info| info.nonce)
    }

    /// Set the balance of an account, returning the previous balance.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<U256, Db::Error> {
        self.modify_account(address, |info| info.balance = balance).map(|info| info.balance)
    }

    /// Set the code of an account, returning the previous code hash.
    pub fn set_code(&mut self, address: Address, code: Bytecode) -> Result<B256, Db::Error> {
        let code_hash = code.hash_slow();
        self.modify_account(address, |info| {
            info.code_hash = code_hash;
            info.code = Some(code);
        })
        .map(|info| info.code_hash)
    }
}

impl<Db> SnapshotStore for StateStore<Db> {
    fn take_snapshot(&mut self) -> Snapshot {
        self.journal.checkpoint()
    }

    fn restore(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        for AccountChange { address, previous } in self.journal.revert(snapshot)?.rev() {
            match previous {
                Some(info) => self.accounts.insert(address, info),
                None => self.accounts.remove(&address),
            };
        }
        Ok(())
    }

    fn release(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        self.journal.release(snapshot)
    }

    fn commit(&mut self) {
        self.journal.clear();
    }
}
