//! Fixtures and a deterministic [`TxApplier`] for tests.

use crate::{
    db::Ledger, ApplyError, BundleMembership, FailureKind, ProcessingOptions, ReceiptsTracer,
    Transaction, TxApplier,
};
use alloy::{
    consensus::{Block, BlockBody, Header},
    primitives::{map::HashMap, Address, Bytes, TxKind, B256, U256},
};
use revm::{
    context::result::{HaltReason, OutOfGasError},
    state::AccountInfo,
    DatabaseRef,
};

/// The contract whose storage scripted transactions write to.
pub const CONTRACT: Address = Address::repeat_byte(0xcc);

/// Balance given to each test account.
pub const TEST_BALANCE: u64 = 1_000_000_000_000_000_000;

/// A storage slot of [`CONTRACT`].
pub fn slot(n: u64) -> U256 {
    U256::from(n)
}

/// Make a call to [`CONTRACT`] from `Address::repeat_byte(sender)`.
pub fn tx(sender: u8, nonce: u64, gas_limit: u64) -> Transaction {
    Transaction::new(
        Address::repeat_byte(sender),
        nonce,
        gas_limit,
        1,
        TxKind::Call(CONTRACT),
        U256::ZERO,
        Bytes::new(),
    )
}

/// Put a transaction in a bundle.
pub fn member(tx: Transaction, bundle_hash: B256, can_revert: bool) -> Transaction {
    tx.in_bundle(BundleMembership::new(bundle_hash).with_can_revert(can_revert))
}

/// Make a block holding the candidates.
pub fn block(candidates: Vec<Transaction>, gas_limit: u64) -> Block<Transaction> {
    Block {
        header: Header { number: 1, gas_limit, ..Default::default() },
        body: BlockBody { transactions: candidates, ommers: vec![], withdrawals: None },
    }
}

/// Make a ledger where accounts `0x01..=0x10` (repeated byte) hold
/// [`TEST_BALANCE`].
pub fn ledger_with_accounts() -> Ledger {
    let mut ledger = Ledger::default();
    for byte in 1..=0x10u8 {
        let info = AccountInfo { balance: U256::from(TEST_BALANCE), ..Default::default() };
        ledger.state.insert_account(Address::repeat_byte(byte), info);
    }
    ledger
}

/// The outcome a [`Script`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// The transaction succeeds.
    Success,
    /// The transaction reverts.
    Revert,
    /// The transaction runs out of gas.
    Halt,
    /// The transaction is rejected before execution.
    Invalid,
}

/// What a [`ScriptedApplier`] does with one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// The reported outcome.
    pub outcome: ScriptedOutcome,
    /// Gas used. Defaults to the transaction's gas limit.
    pub gas_used: Option<u64>,
    /// Slots of [`CONTRACT`] incremented on success.
    pub increments: Vec<U256>,
}

impl Default for Script {
    fn default() -> Self {
        Self::success()
    }
}

impl Script {
    const fn new(outcome: ScriptedOutcome) -> Self {
        Self { outcome, gas_used: None, increments: Vec::new() }
    }

    /// Succeed.
    pub const fn success() -> Self {
        Self::new(ScriptedOutcome::Success)
    }

    /// Revert.
    pub const fn revert() -> Self {
        Self::new(ScriptedOutcome::Revert)
    }

    /// Halt.
    pub const fn halt() -> Self {
        Self::new(ScriptedOutcome::Halt)
    }

    /// Be rejected.
    pub const fn invalid() -> Self {
        Self::new(ScriptedOutcome::Invalid)
    }

    /// Use a fixed amount of gas.
    pub const fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = Some(gas_used);
        self
    }

    /// Increment a slot of [`CONTRACT`] on success.
    pub fn incrementing(mut self, slot: U256) -> Self {
        self.increments.push(slot);
        self
    }
}

/// A [`TxApplier`] that follows per-transaction [`Script`]s instead of
/// executing code.
///
/// Unless nonce verification is skipped, a transaction whose nonce differs
/// from the sender's is rejected. Executed transactions bump the sender's
/// nonce. Transactions without a script succeed.
#[derive(Debug, Clone, Default)]
pub struct ScriptedApplier {
    scripts: HashMap<B256, Script>,
    observed: Vec<U256>,
    observed_originals: Vec<U256>,
}

impl ScriptedApplier {
    /// Set the script for a transaction.
    pub fn with_script(mut self, tx_hash: B256, script: Script) -> Self {
        self.scripts.insert(tx_hash, script);
        self
    }

    /// Every slot value read before an increment, in order.
    pub fn observed(&self) -> &[U256] {
        &self.observed
    }

    /// The original value of every incremented slot, read before the
    /// increment, in order.
    pub fn observed_originals(&self) -> &[U256] {
        &self.observed_originals
    }
}

impl<Db: DatabaseRef> TxApplier<Db> for ScriptedApplier {
    type Error = ApplyError<Db::Error>;

    fn apply(
        &mut self,
        tx: &Transaction,
        _header: &Header,
        options: &ProcessingOptions,
        ledger: &mut Ledger<Db>,
        tracer: &mut ReceiptsTracer,
    ) -> Result<(), Self::Error> {
        let script = self.scripts.get(&tx.hash()).cloned().unwrap_or_default();
        let nonce = ledger.state.nonce(tx.sender())?;

        let failure = match script.outcome {
            _ if !options.skip_nonce_verification && tx.nonce() != nonce => {
                Some(FailureKind::Invalid(format!("nonce {} expected {nonce}", tx.nonce())))
            }
            ScriptedOutcome::Invalid => Some(FailureKind::Invalid("scripted".into())),
            ScriptedOutcome::Success => None,
            ScriptedOutcome::Revert => Some(FailureKind::Revert { output: Bytes::new() }),
            ScriptedOutcome::Halt => {
                Some(FailureKind::Halt(HaltReason::OutOfGas(OutOfGasError::Basic)))
            }
        };

        if let Some(failure @ FailureKind::Invalid(_)) = failure {
            return tracer.mark_as_failed(0, failure).map_err(ApplyError::Tracer);
        }

        ledger.state.increment_nonce(tx.sender())?;
        let gas_used = script.gas_used.unwrap_or(tx.gas_limit());

        match failure {
            Some(failure) => tracer.mark_as_failed(gas_used, failure),
            None => {
                for slot in script.increments {
                    self.observed_originals.push(ledger.storage.original_value(CONTRACT, slot)?);
                    let value = ledger.storage.get(CONTRACT, slot)?;
                    self.observed.push(value);
                    ledger.storage.set(CONTRACT, slot, value + U256::from(1))?;
                }
                tracer.mark_as_success(gas_used, vec![], Bytes::new())
            }
        }
        .map_err(ApplyError::Tracer)
    }
}
