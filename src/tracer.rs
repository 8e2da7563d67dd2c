use crate::{FailureKind, Receipt, Transaction};
use alloy::primitives::{Bytes, Log, B256};

/// Misuse of the [`ReceiptsTracer`]. These indicate a logic bug in the
/// caller or the applier, and are not recoverable.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TracerError {
    /// A trace was started while another one was open.
    #[error("trace for {0} is still open")]
    TraceOpen(B256),
    /// An outcome was reported, or a trace ended, with no open trace.
    #[error("no open trace")]
    NoOpenTrace,
    /// An outcome was reported twice for the same transaction.
    #[error("outcome for {0} was already reported")]
    OutcomeReported(B256),
    /// A trace was ended before an outcome was reported.
    #[error("trace for {0} ended without an outcome")]
    MissingOutcome(B256),
    /// A restore was requested to a point past the recorded receipts.
    #[error("cannot restore to {requested} receipts, only {recorded} recorded")]
    RestoreBeyond {
        /// The requested receipt count.
        requested: usize,
        /// The number of recorded receipts.
        recorded: usize,
    },
    /// A restore was requested while a trace was open.
    #[error("cannot restore while trace for {0} is open")]
    RestoreDuringTrace(B256),
}

#[derive(Debug)]
struct OpenTrace {
    tx_hash: B256,
    outcome: Option<Outcome>,
}

#[derive(Debug)]
struct Outcome {
    gas_used: u64,
    logs: Vec<Log>,
    output: Bytes,
    failure: Option<FailureKind>,
}

/// Records one [`Receipt`] per executed transaction, in execution order.
///
/// Each transaction is bracketed by [`start_tx_trace`] and [`end_tx_trace`].
/// In between, the applier reports exactly one outcome with
/// [`mark_as_success`] or [`mark_as_failed`]. Recorded receipts can be
/// truncated back to an earlier count with [`restore_snapshot`].
///
/// [`start_tx_trace`]: Self::start_tx_trace
/// [`end_tx_trace`]: Self::end_tx_trace
/// [`mark_as_success`]: Self::mark_as_success
/// [`mark_as_failed`]: Self::mark_as_failed
/// [`restore_snapshot`]: Self::restore_snapshot
#[derive(Debug, Default)]
pub struct ReceiptsTracer {
    receipts: Vec<Receipt>,
    open: Option<OpenTrace>,
}

impl ReceiptsTracer {
    /// Create a new, empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a trace for the transaction.
    pub fn start_tx_trace(&mut self, tx: &Transaction) -> Result<(), TracerError> {
        if let Some(open) = &self.open {
            return Err(TracerError::TraceOpen(open.tx_hash));
        }
        self.open = Some(OpenTrace { tx_hash: tx.hash(), outcome: None });
        Ok(())
    }

    fn report(&mut self, outcome: Outcome) -> Result<(), TracerError> {
        let open = self.open.as_mut().ok_or(TracerError::NoOpenTrace)?;
        if open.outcome.is_some() {
            return Err(TracerError::OutcomeReported(open.tx_hash));
        }
        open.outcome = Some(outcome);
        Ok(())
    }

    /// Report that the open transaction succeeded.
    pub fn mark_as_success(
        &mut self,
        gas_used: u64,
        logs: Vec<Log>,
        output: Bytes,
    ) -> Result<(), TracerError> {
        self.report(Outcome { gas_used, logs, output, failure: None })
    }

    /// Report that the open transaction failed.
    pub fn mark_as_failed(&mut self, gas_used: u64, failure: FailureKind) -> Result<(), TracerError> {
        self.report(Outcome {
            gas_used,
            logs: Vec::new(),
            output: Bytes::new(),
            failure: Some(failure),
        })
    }

    /// Close the open trace and record its receipt.
    pub fn end_tx_trace(&mut self) -> Result<&Receipt, TracerError> {
        let open = self.open.take().ok_or(TracerError::NoOpenTrace)?;
        let Some(outcome) = open.outcome else {
            return Err(TracerError::MissingOutcome(open.tx_hash));
        };

        let cumulative_gas_used = self.cumulative_gas_used() + outcome.gas_used;
        self.receipts.push(Receipt {
            tx_hash: open.tx_hash,
            gas_used: outcome.gas_used,
            cumulative_gas_used,
            logs: outcome.logs,
            output: outcome.output,
            failure: outcome.failure,
        });
        Ok(&self.receipts[self.receipts.len() - 1])
    }

    /// True if a trace is open.
    pub const fn is_tracing(&self) -> bool {
        self.open.is_some()
    }

    /// The number of recorded receipts, usable with
    /// [`ReceiptsTracer::restore_snapshot`].
    pub fn take_snapshot(&self) -> usize {
        self.receipts.len()
    }

    /// Truncate the recorded receipts to `len`.
    pub fn restore_snapshot(&mut self, len: usize) -> Result<(), TracerError> {
        if let Some(open) = &self.open {
            return Err(TracerError::RestoreDuringTrace(open.tx_hash));
        }
        if len > self.receipts.len() {
            return Err(TracerError::RestoreBeyond { requested: len, recorded: self.receipts.len() });
        }
        self.receipts.truncate(len);
        Ok(())
    }

    /// The most recently recorded receipt.
    pub fn last_receipt(&self) -> Option<&Receipt> {
        self.receipts.last()
    }

    /// All recorded receipts, in execution order.
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Consume the tracer, returning the recorded receipts.
    pub fn into_receipts(self) -> Vec<Receipt> {
        self.receipts
    }

    /// Gas used by all recorded transactions.
    pub fn cumulative_gas_used(&self) -> u64 {
        self.receipts.last().map(|r| r.cumulative_gas_used).unwrap_or_default()
    }
}
