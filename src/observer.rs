use crate::{Receipt, Transaction};

/// Observes transactions as they are accepted into a block.
///
/// Notifications arrive in final block order. Bundle members are only
/// reported once their bundle has succeeded, so an observer never sees a
/// transaction that is later rolled back.
pub trait TxObserver {
    /// Called for each accepted transaction, with its index in the block
    /// body and its receipt.
    fn on_processed(&mut self, index: usize, tx: &Transaction, receipt: &Receipt);
}

impl TxObserver for () {
    fn on_processed(&mut self, _index: usize, _tx: &Transaction, _receipt: &Receipt) {}
}

impl<F> TxObserver for F
where
    F: FnMut(usize, &Transaction, &Receipt),
{
    fn on_processed(&mut self, index: usize, tx: &Transaction, receipt: &Receipt) {
        self(index, tx, receipt)
    }
}
