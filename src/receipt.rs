use alloy::{
    primitives::{Bytes, Log, B256},
    sol_types::decode_revert_reason,
};
use revm::context::result::HaltReason;

/// Why a transaction failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Execution reverted. State changes of the transaction are discarded,
    /// but gas is charged.
    Revert {
        /// The revert data.
        output: Bytes,
    },
    /// Execution halted, e.g. out of gas or an invalid opcode.
    Halt(HaltReason),
    /// The transaction was rejected before execution, e.g. for a bad nonce
    /// or insufficient balance.
    Invalid(String),
}

impl FailureKind {
    /// True for [`FailureKind::Revert`].
    pub const fn is_revert(&self) -> bool {
        matches!(self, Self::Revert { .. })
    }

    /// True if the transaction ran and failed, as opposed to being rejected
    /// before execution.
    pub const fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Revert { .. } | Self::Halt(_))
    }

    /// Decode a human-readable revert reason from the revert data, if any.
    pub fn revert_reason(&self) -> Option<String> {
        match self {
            Self::Revert { output } => decode_revert_reason(output),
            _ => None,
        }
    }
}

/// The outcome of applying a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the transaction.
    pub tx_hash: B256,
    /// Gas used by this transaction.
    pub gas_used: u64,
    /// Gas used by this and all preceding transactions in the block.
    pub cumulative_gas_used: u64,
    /// Logs emitted by the transaction. Empty on failure.
    pub logs: Vec<Log>,
    /// Return data of the transaction. Empty on failure.
    pub output: Bytes,
    /// Failure reason, `None` on success.
    pub failure: Option<FailureKind>,
}

impl Receipt {
    /// True if the transaction succeeded.
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// True if the transaction reverted.
    pub fn is_revert(&self) -> bool {
        self.failure.as_ref().is_some_and(FailureKind::is_revert)
    }

    /// Convert to an Ethereum [`alloy::consensus::Receipt`].
    pub fn to_consensus(&self) -> alloy::consensus::Receipt {
        alloy::consensus::Receipt {
            status: self.is_success().into(),
            cumulative_gas_used: self.cumulative_gas_used,
            logs: self.logs.clone(),
        }
    }
}
