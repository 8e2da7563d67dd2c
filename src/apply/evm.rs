use crate::{
    db::Ledger, helpers::Ctx, ApplyError, FailureKind, ProcessingOptions, ReceiptsTracer,
    Transaction, TxApplier,
};
use alloy::{consensus::Header, primitives::U256};
use revm::{
    context::{
        result::{EVMError, ExecutionResult},
        BlockEnv,
    },
    inspector::NoOpInspector,
    primitives::hardfork::SpecId,
    DatabaseRef, InspectEvm, MainBuilder,
};

/// A [`TxApplier`] that executes transactions with revm, directly on top of
/// the [`Ledger`].
///
/// The EVM is built fresh for every transaction. Its state diff is written
/// to the ledger stores, so ledger snapshots cover EVM execution too.
#[derive(Debug, Clone, Copy)]
pub struct EvmApplier {
    spec_id: SpecId,
    chain_id: u64,
}

impl Default for EvmApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl EvmApplier {
    /// Create a new applier for mainnet at the Prague hardfork.
    pub const fn new() -> Self {
        Self { spec_id: SpecId::PRAGUE, chain_id: 1 }
    }

    /// Set the hardfork.
    pub const fn with_spec_id(mut self, spec_id: SpecId) -> Self {
        self.spec_id = spec_id;
        self
    }

    /// Set the chain id.
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// The hardfork.
    pub const fn spec_id(&self) -> SpecId {
        self.spec_id
    }

    /// The chain id.
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

fn fill_block_env(header: &Header, block_env: &mut BlockEnv) {
    block_env.number = U256::from(header.number);
    block_env.beneficiary = header.beneficiary;
    block_env.timestamp = U256::from(header.timestamp);
    block_env.gas_limit = header.gas_limit;
    block_env.basefee = header.base_fee_per_gas.unwrap_or_default();
    block_env.difficulty = header.difficulty;
    block_env.prevrandao = Some(header.mix_hash);
}

impl<Db: DatabaseRef> TxApplier<Db> for EvmApplier {
    type Error = ApplyError<Db::Error>;

    fn apply(
        &mut self,
        tx: &Transaction,
        header: &Header,
        options: &ProcessingOptions,
        ledger: &mut Ledger<Db>,
        tracer: &mut ReceiptsTracer,
    ) -> Result<(), Self::Error> {
        let mut tx_env = tx.tx_env();
        if options.skip_nonce_verification {
            tx_env.nonce = ledger.state.nonce(tx.sender())?;
        }

        let result = {
            let mut evm = Ctx::new(ledger.view(), self.spec_id)
                .build_mainnet_with_inspector(NoOpInspector);
            evm.ctx.modify_cfg(|cfg| cfg.chain_id = self.chain_id);
            evm.ctx.modify_block(|block_env| fill_block_env(header, block_env));
            evm.inspect_tx(tx_env)
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(EVMError::Database(err)) => return Err(err.into()),
            Err(err) => {
                tracing::trace!(tx = %tx.hash(), %err, "transaction rejected");
                return tracer
                    .mark_as_failed(0, FailureKind::Invalid(err.to_string()))
                    .map_err(ApplyError::Tracer);
            }
        };

        ledger.apply_evm_state(outcome.state)?;

        match outcome.result {
            ExecutionResult::Success { gas_used, logs, output, .. } => {
                tracer.mark_as_success(gas_used, logs, output.into_data())
            }
            ExecutionResult::Revert { gas_used, output } => {
                tracer.mark_as_failed(gas_used, FailureKind::Revert { output })
            }
            ExecutionResult::Halt { reason, gas_used } => {
                tracer.mark_as_failed(gas_used, FailureKind::Halt(reason))
            }
        }
        .map_err(ApplyError::Tracer)
    }
}
