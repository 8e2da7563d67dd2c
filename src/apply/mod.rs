//! Transaction appliers.
//!
//! A [`TxApplier`] executes one transaction against a [`Ledger`] and reports
//! its outcome to a [`ReceiptsTracer`]. The block producer brackets each
//! call with [`ReceiptsTracer::start_tx_trace`] and
//! [`ReceiptsTracer::end_tx_trace`].

mod evm;
pub use evm::EvmApplier;

use crate::{db::Ledger, ProcessingOptions, ReceiptsTracer, TracerError, Transaction};
use alloy::consensus::Header;
use revm::DatabaseRef;

/// Errors that abort a transaction applier.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError<E> {
    /// The tracer was misused.
    #[error(transparent)]
    Tracer(TracerError),
    /// The backing database failed.
    #[error("database error: {0}")]
    Database(E),
}

impl<E> From<E> for ApplyError<E> {
    fn from(err: E) -> Self {
        Self::Database(err)
    }
}

/// Executes transactions against a [`Ledger`].
///
/// Implementations must report exactly one outcome per call, via
/// [`ReceiptsTracer::mark_as_success`] or [`ReceiptsTracer::mark_as_failed`].
/// Reverts, halts and rejected transactions are outcomes, not errors. `Err`
/// is reserved for conditions that must abort the block build, such as a
/// failing backing database.
pub trait TxApplier<Db: DatabaseRef> {
    /// An error type for this applier.
    type Error: core::error::Error + From<Db::Error>;

    /// Apply the transaction, mutating the ledger and reporting the outcome
    /// to the tracer.
    fn apply(
        &mut self,
        tx: &Transaction,
        header: &Header,
        options: &ProcessingOptions,
        ledger: &mut Ledger<Db>,
        tracer: &mut ReceiptsTracer,
    ) -> Result<(), Self::Error>;
}

impl<Db, T> TxApplier<Db> for &mut T
where
    Db: DatabaseRef,
    T: TxApplier<Db> + ?Sized,
{
    type Error = T::Error;

    fn apply(
        &mut self,
        tx: &Transaction,
        header: &Header,
        options: &ProcessingOptions,
        ledger: &mut Ledger<Db>,
        tracer: &mut ReceiptsTracer,
    ) -> Result<(), Self::Error> {
        (**self).apply(tx, header, options, ledger, tracer)
    }
}
