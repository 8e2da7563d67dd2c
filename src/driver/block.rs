use crate::{
    db::{Ledger, SnapshotError, SnapshotStore},
    driver::bundle::{BundleCheckpoint, BundleRun},
    transactions_root, OrderedSet, ProcessingOptions, Receipt, ReceiptsTracer, TracerError,
    Transaction, TxApplier, TxObserver,
};
use alloy::{consensus::Header, primitives::B256};
use revm::DatabaseRef;
use tracing::{debug, debug_span, trace, warn};

/// Errors that abort a block build.
///
/// Failing transactions and failing bundles are never errors. These indicate
/// a failing applier or a broken rollback invariant.
#[derive(Debug, thiserror::Error)]
pub enum BuildError<E> {
    /// The applier failed.
    #[error("applier error: {0}")]
    Apply(E),
    /// The receipts tracer was misused.
    #[error(transparent)]
    Tracer(#[from] TracerError),
    /// A snapshot handle was misused.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Produces block bodies from candidate transactions, executing bundles
/// atomically.
///
/// Candidates are scanned in order. Standalone transactions are applied
/// immediately. Consecutive candidates sharing a bundle hash are collected
/// into a run, which is executed as a unit when the run ends: if a member
/// fails and may not revert, every effect of the bundle is rolled back and
/// none of its members are included.
///
/// Scanning stops at the first candidate whose gas limit exceeds the
/// remaining block gas. Later candidates are not considered, even if they
/// would fit. The pending run is still executed when scanning stops, so a
/// bundle whose later members did not fit is judged on the members
/// collected so far, and may be included without them. Callers that need
/// whole bundles should only submit bundles that fit the block.
///
/// Storage originals follow the transactions: after every applied
/// transaction, the storage floor is advanced, so each transaction sees the
/// previous one's writes as the original values of its slots.
///
/// ```
/// use bundle_builder::{BlockProducer, EvmApplier, ProcessingOptions};
///
/// let producer = BlockProducer::new(EvmApplier::new())
///     .with_options(ProcessingOptions::default().with_skip_nonce_verification(true));
/// assert!(producer.options().skip_nonce_verification);
/// ```
#[derive(Debug, Clone)]
pub struct BlockProducer<A> {
    applier: A,
    options: ProcessingOptions,
}

impl<A> BlockProducer<A> {
    /// Create a new producer with default options.
    pub fn new(applier: A) -> Self {
        Self { applier, options: ProcessingOptions::default() }
    }

    /// Set the processing options.
    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the processing options.
    pub const fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Get a reference to the applier.
    pub const fn applier(&self) -> &A {
        &self.applier
    }

    /// Get a mutable reference to the applier.
    pub fn applier_mut(&mut self) -> &mut A {
        &mut self.applier
    }

    /// Consume the producer, returning the applier.
    pub fn into_applier(self) -> A {
        self.applier
    }

    /// Build the block body.
    ///
    /// On input the block body holds the candidates. On output it holds the
    /// accepted transactions, and the header's gas used and transactions
    /// root are set. Both ledger stores are committed.
    ///
    /// Returns every receipt held by the tracer, aligned with the accepted
    /// transactions. The observer is notified of each accepted transaction,
    /// in order.
    pub fn process_transactions<Db, O>(
        &mut self,
        block: &mut alloy::consensus::Block<Transaction>,
        ledger: &mut Ledger<Db>,
        tracer: &mut ReceiptsTracer,
        observer: &mut O,
    ) -> Result<Vec<Receipt>, BuildError<A::Error>>
    where
        Db: DatabaseRef,
        A: TxApplier<Db>,
        O: TxObserver,
    {
        let candidates = core::mem::take(&mut block.body.transactions);
        let span = debug_span!(
            "process_transactions",
            number = block.header.number,
            gas_limit = block.header.gas_limit,
            candidates = candidates.len(),
        );
        let _enter = span.enter();

        let mut build = Build {
            applier: &mut self.applier,
            options: &self.options,
            base_gas_used: block.header.gas_used,
            base_cumulative_gas: tracer.cumulative_gas_used(),
            header: &mut block.header,
            ledger,
            tracer,
            observer,
            accepted: OrderedSet::default(),
            run: BundleRun::default(),
        };
        build.scan(candidates)?;

        let Build { ledger, tracer, accepted, .. } = build;
        ledger.state.commit();
        ledger.storage.commit();
        let receipts = tracer.receipts().to_vec();

        block.body.transactions = accepted.into_vec();
        block.header.transactions_root = transactions_root(&block.body.transactions);
        debug!(
            accepted = block.body.transactions.len(),
            gas_used = block.header.gas_used,
            "block built"
        );

        Ok(receipts)
    }
}

/// State of a single block build.
struct Build<'a, A, Db, O> {
    applier: &'a mut A,
    options: &'a ProcessingOptions,
    header: &'a mut Header,
    ledger: &'a mut Ledger<Db>,
    tracer: &'a mut ReceiptsTracer,
    observer: &'a mut O,
    base_gas_used: u64,
    base_cumulative_gas: u64,
    accepted: OrderedSet<Transaction>,
    run: BundleRun,
}

impl<A, Db, O> Build<'_, A, Db, O>
where
    Db: DatabaseRef,
    A: TxApplier<Db>,
    O: TxObserver,
{
    fn remaining_gas(&self) -> u64 {
        self.header.gas_limit.saturating_sub(self.header.gas_used)
    }

    /// Gas admission. `false` ends the scan.
    fn admits(&self, tx: &Transaction) -> bool {
        let remaining = self.remaining_gas();
        if tx.gas_limit() > remaining {
            debug!(
                tx = %tx.hash(),
                gas_limit = tx.gas_limit(),
                remaining,
                "candidate does not fit, halting scan"
            );
            return false;
        }
        true
    }

    fn sync_gas_used(&mut self) {
        self.header.gas_used = self.base_gas_used
            + self.tracer.cumulative_gas_used().saturating_sub(self.base_cumulative_gas);
    }

    fn scan(&mut self, candidates: Vec<Transaction>) -> Result<(), BuildError<A::Error>> {
        for tx in candidates {
            if self.accepted.contains(&tx) {
                trace!(tx = %tx.hash(), "skipping duplicate");
                continue;
            }
            if !self.admits(&tx) {
                return self.flush();
            }

            match (self.run.bundle_hash(), tx.bundle_hash()) {
                (None, None) => self.apply_standalone(tx)?,
                (None, Some(_)) => self.run.push(tx),
                (Some(current), Some(bundle_hash)) if current == bundle_hash => {
                    if self.run.contains(&tx) {
                        trace!(tx = %tx.hash(), "skipping duplicate bundle member");
                        continue;
                    }
                    self.run.push(tx);
                }
                (Some(_), next) => {
                    self.flush()?;
                    if self.accepted.contains(&tx) {
                        trace!(tx = %tx.hash(), "skipping duplicate");
                        continue;
                    }
                    if !self.admits(&tx) {
                        return Ok(());
                    }
                    if next.is_some() {
                        self.run.push(tx);
                    } else {
                        self.apply_standalone(tx)?;
                    }
                }
            }
        }
        self.flush()
    }

    /// Apply a single transaction, bracketed by the tracer.
    fn apply(&mut self, tx: &mut Transaction) -> Result<Receipt, BuildError<A::Error>> {
        if self.options.skip_nonce_verification {
            let nonce = self
                .ledger
                .state
                .nonce(tx.sender())
                .map_err(|err| BuildError::Apply(err.into()))?;
            tx.set_nonce(nonce);
        }

        self.tracer.start_tx_trace(tx)?;
        self.applier
            .apply(tx, &*self.header, self.options, self.ledger, self.tracer)
            .map_err(BuildError::Apply)?;
        let receipt = self.tracer.end_tx_trace()?.clone();
        self.sync_gas_used();

        trace!(
            tx = %tx.hash(),
            success = receipt.is_success(),
            gas_used = receipt.gas_used,
            "applied transaction"
        );
        Ok(receipt)
    }

    fn accept(&mut self, tx: Transaction, receipt: &Receipt) {
        self.observer.on_processed(self.accepted.len(), &tx, receipt);
        self.accepted.insert(tx);
    }

    fn apply_standalone(&mut self, mut tx: Transaction) -> Result<(), BuildError<A::Error>> {
        let receipt = self.apply(&mut tx)?;
        self.ledger.storage.advance_floor();
        self.accept(tx, &receipt);
        Ok(())
    }

    /// Execute the pending bundle run atomically.
    fn flush(&mut self) -> Result<(), BuildError<A::Error>> {
        let Some((bundle_hash, members)) = self.run.take() else { return Ok(()) };
        let checkpoint = BundleCheckpoint::take(self.ledger, self.tracer);

        let mut executed: Vec<(Transaction, Receipt)> = Vec::with_capacity(members.len());
        let mut failed = false;
        for mut tx in members {
            let remaining = self.remaining_gas();
            if tx.gas_limit() > remaining {
                warn!(
                    bundle = %bundle_hash,
                    tx = %tx.hash(),
                    gas_limit = tx.gas_limit(),
                    remaining,
                    "bundle member exceeds remaining block gas"
                );
                failed = true;
                break;
            }

            let receipt = self.apply(&mut tx)?;
            let tolerated = match &receipt.failure {
                None => true,
                Some(failure) if failure.is_execution_failure() => tx.can_revert(),
                Some(_) => false,
            };
            if !tolerated {
                debug!(bundle = %bundle_hash, tx = %tx.hash(), "bundle member failed");
                failed = true;
                break;
            }

            self.ledger.storage.take_floor_snapshot();
            executed.push((tx, receipt));
        }

        if failed {
            checkpoint.restore::<_, A::Error>(self.ledger, self.tracer)?;
            self.sync_gas_used();
            debug!(bundle = %bundle_hash, executed = executed.len(), "bundle rolled back");
            return Ok(());
        }

        checkpoint.release::<_, A::Error>(self.ledger)?;
        debug!(bundle = %bundle_hash, members = executed.len(), "bundle included");
        for (tx, receipt) in executed {
            self.accept(tx, &receipt);
        }
        Ok(())
    }
}

/// The bundle hash of each run of bundle members in a block body, in block
/// order. Useful for reporting which bundles made it into a block.
///
/// A run is a maximal sequence of adjacent transactions sharing a bundle
/// hash. A standalone transaction between two members of the same bundle
/// splits them into two runs, matching how they were executed.
pub fn included_bundles(txs: &[Transaction]) -> Vec<B256> {
    let mut previous = None;
    txs.iter()
        .filter_map(|tx| {
            let current = tx.bundle_hash();
            let starts_run = current.is_some() && current != previous;
            previous = current;
            current.filter(|_| starts_run)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        block, ledger_with_accounts, member, slot, tx, Script, ScriptedApplier, CONTRACT,
    };
    use crate::{db::Ledger, ApplyError, TxApplier};
    use alloy::{
        consensus::Header,
        primitives::{Address, U256},
    };
    use revm::DatabaseRef;

    /// Records the snapshot depths of both stores as each transaction is
    /// applied.
    #[derive(Default)]
    struct DepthRecorder {
        inner: ScriptedApplier,
        depths: Vec<(usize, usize)>,
    }

    impl<Db: DatabaseRef> TxApplier<Db> for DepthRecorder {
        type Error = ApplyError<Db::Error>;

        fn apply(
            &mut self,
            tx: &Transaction,
            header: &Header,
            options: &ProcessingOptions,
            ledger: &mut Ledger<Db>,
            tracer: &mut ReceiptsTracer,
        ) -> Result<(), Self::Error> {
            self.depths.push((ledger.state.snapshot_depth(), ledger.storage.snapshot_depth()));
            self.inner.apply(tx, header, options, ledger, tracer)
        }
    }

    fn hashes(txs: &[Transaction]) -> Vec<B256> {
        txs.iter().map(Transaction::hash).collect()
    }

    fn build(
        applier: &mut ScriptedApplier,
        candidates: Vec<Transaction>,
        gas_limit: u64,
    ) -> (alloy::consensus::Block<Transaction>, Vec<Receipt>, Ledger) {
        let mut block = block(candidates, gas_limit);
        let mut ledger = ledger_with_accounts();
        let mut tracer = ReceiptsTracer::new();
        let receipts = BlockProducer::new(applier)
            .process_transactions(&mut block, &mut ledger, &mut tracer, &mut ())
            .unwrap();
        (block, receipts, ledger)
    }

    #[test]
    fn standalone_transactions() {
        let (a, b) = (tx(1, 0, 21_000), tx(2, 0, 50_000));
        let mut applier = ScriptedApplier::default();
        let (block, receipts, _) = build(&mut applier, vec![a.clone(), b.clone()], 1_000_000);

        assert_eq!(hashes(&block.body.transactions), vec![a.hash(), b.hash()]);
        assert_eq!(receipts.len(), 2);
        assert_eq!(block.header.gas_used, 71_000);
        assert_eq!(block.header.transactions_root, transactions_root(&[a, b]));
    }

    #[test]
    fn duplicates_are_skipped() {
        let a = tx(1, 0, 21_000);
        let bundle = B256::repeat_byte(1);
        let in_bundle = member(tx(2, 0, 21_000), bundle, false);
        let candidates = vec![a.clone(), a.clone(), in_bundle.clone(), in_bundle.clone(), a];

        let mut applier = ScriptedApplier::default();
        let (block, receipts, _) = build(&mut applier, candidates, 1_000_000);

        assert_eq!(block.body.transactions.len(), 2);
        assert_eq!(receipts.len(), 2);
        for (tx, receipt) in block.body.transactions.iter().zip(&receipts) {
            assert_eq!(tx.hash(), receipt.tx_hash);
        }
    }

    #[test]
    fn gas_admission_halts_scan() {
        let big = tx(1, 0, 10);
        let small = tx(2, 0, 5);
        let mut applier = ScriptedApplier::default();
        let (block, receipts, _) = build(&mut applier, vec![big, small], 8);

        assert!(block.body.transactions.is_empty());
        assert!(receipts.is_empty());
        assert_eq!(block.header.gas_used, 0);
    }

    #[test]
    fn gas_admission_halts_after_filling() {
        let (a, b, c) = (tx(1, 0, 60), tx(2, 0, 50), tx(3, 0, 10));
        let mut applier = ScriptedApplier::default();
        let (block, _, _) = build(&mut applier, vec![a.clone(), b, c], 100);

        assert_eq!(hashes(&block.body.transactions), vec![a.hash()]);
        assert!(block.header.gas_used <= block.header.gas_limit);
    }

    #[test]
    fn consecutive_bundles() {
        let (one, two) = (B256::repeat_byte(1), B256::repeat_byte(2));
        let a = member(tx(1, 0, 21_000), one, false);
        let b = member(tx(2, 0, 21_000), one, false);
        let c = member(tx(3, 0, 21_000), two, false);

        let mut applier = ScriptedApplier::default();
        let (block, receipts, _) = build(&mut applier, vec![a.clone(), b.clone(), c.clone()], 1_000_000);

        assert_eq!(hashes(&block.body.transactions), vec![a.hash(), b.hash(), c.hash()]);
        assert_eq!(hashes(&block.body.transactions), receipts.iter().map(|r| r.tx_hash).collect::<Vec<_>>());
        assert_eq!(included_bundles(&block.body.transactions), vec![one, two]);
    }

    #[test]
    fn failed_bundle_leaves_no_trace() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 21_000), one, false);
        let b = member(tx(2, 0, 21_000), one, false);
        let c = tx(3, 0, 21_000);

        let mut applier = ScriptedApplier::default()
            .with_script(a.hash(), Script::revert())
            .with_script(b.hash(), Script::success().incrementing(slot(0)));
        let (block, receipts, ledger) = build(&mut applier, vec![a, b, c.clone()], 1_000_000);

        assert_eq!(hashes(&block.body.transactions), vec![c.hash()]);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].tx_hash, c.hash());
        assert_eq!(receipts[0].cumulative_gas_used, 21_000);
        assert_eq!(block.header.gas_used, 21_000);

        // a and b were rolled back
        assert_eq!(ledger.state.nonce(Address::repeat_byte(1)).unwrap(), 0);
        assert_eq!(ledger.storage.get(CONTRACT, slot(0)).unwrap(), U256::ZERO);
        assert_eq!(ledger.state.nonce(Address::repeat_byte(3)).unwrap(), 1);
    }

    #[test]
    fn late_failure_rolls_back_earlier_members() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 21_000), one, false);
        let b = member(tx(2, 0, 21_000), one, false);

        let mut applier = ScriptedApplier::default()
            .with_script(a.hash(), Script::success().incrementing(slot(0)))
            .with_script(b.hash(), Script::revert());
        let (block, receipts, ledger) = build(&mut applier, vec![a, b], 1_000_000);

        assert!(block.body.transactions.is_empty());
        assert!(receipts.is_empty());
        assert_eq!(ledger.storage.get(CONTRACT, slot(0)).unwrap(), U256::ZERO);
        assert_eq!(ledger.state.nonce(Address::repeat_byte(1)).unwrap(), 0);
    }

    #[test]
    fn tolerated_revert_keeps_bundle() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 21_000), one, true);
        let b = member(tx(2, 0, 21_000), one, false);

        let mut applier = ScriptedApplier::default()
            .with_script(a.hash(), Script::revert())
            .with_script(b.hash(), Script::halt());
        let (block, _, _) = build(&mut applier, vec![a.clone(), b.clone()], 1_000_000);
        assert!(block.body.transactions.is_empty(), "intolerant halt fails the bundle");

        let b = member(tx(2, 0, 21_000), one, true);
        let mut applier = ScriptedApplier::default()
            .with_script(a.hash(), Script::revert())
            .with_script(b.hash(), Script::halt());
        let (block, receipts, _) = build(&mut applier, vec![a.clone(), b.clone()], 1_000_000);
        assert_eq!(hashes(&block.body.transactions), vec![a.hash(), b.hash()]);
        assert!(receipts.iter().all(|r| !r.is_success()));
    }

    #[test]
    fn invalid_member_always_fails_bundle() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 21_000), one, true);
        let c = tx(3, 0, 21_000);

        let mut applier = ScriptedApplier::default().with_script(a.hash(), Script::invalid());
        let (block, _, _) = build(&mut applier, vec![a, c.clone()], 1_000_000);
        assert_eq!(hashes(&block.body.transactions), vec![c.hash()]);
    }

    #[test]
    fn invalid_standalone_is_still_included() {
        let a = tx(1, 0, 21_000);
        let mut applier = ScriptedApplier::default().with_script(a.hash(), Script::invalid());
        let (block, receipts, _) = build(&mut applier, vec![a.clone()], 1_000_000);

        assert_eq!(hashes(&block.body.transactions), vec![a.hash()]);
        assert!(!receipts[0].is_success());
    }

    #[test]
    fn bundle_members_see_earlier_writes() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 21_000), one, false);
        let b = member(tx(2, 0, 21_000), one, false);
        let c = member(tx(3, 0, 21_000), one, false);

        let mut applier = ScriptedApplier::default()
            .with_script(a.hash(), Script::success().incrementing(slot(0)))
            .with_script(b.hash(), Script::success().incrementing(slot(0)))
            .with_script(c.hash(), Script::success().incrementing(slot(0)));
        let (block, _, ledger) = build(&mut applier, vec![a, b, c], 1_000_000);

        assert_eq!(block.body.transactions.len(), 3);
        assert_eq!(ledger.storage.get(CONTRACT, slot(0)).unwrap(), U256::from(3));
        assert_eq!(applier.observed(), &[U256::ZERO, U256::from(1), U256::from(2)]);
        assert_eq!(applier.observed_originals(), &[U256::ZERO, U256::from(1), U256::from(2)]);
    }

    #[test]
    fn standalone_transactions_see_earlier_writes_as_originals() {
        let (a, b, c) = (tx(1, 0, 21_000), tx(2, 0, 21_000), tx(3, 0, 21_000));
        let mut applier = ScriptedApplier::default()
            .with_script(a.hash(), Script::success().incrementing(slot(0)))
            .with_script(b.hash(), Script::success().incrementing(slot(0)))
            .with_script(c.hash(), Script::success().incrementing(slot(0)));
        let (_, _, ledger) = build(&mut applier, vec![a, b, c], 1_000_000);

        assert_eq!(ledger.storage.get(CONTRACT, slot(0)).unwrap(), U256::from(3));
        assert_eq!(applier.observed_originals(), &[U256::ZERO, U256::from(1), U256::from(2)]);
    }

    #[test]
    fn originals_survive_a_failed_bundle() {
        let one = B256::repeat_byte(1);
        let s = tx(1, 0, 21_000);
        let a = member(tx(2, 0, 21_000), one, false);
        let b = member(tx(3, 0, 21_000), one, false);
        let t = tx(4, 0, 21_000);

        let mut applier = ScriptedApplier::default()
            .with_script(s.hash(), Script::success().incrementing(slot(0)))
            .with_script(a.hash(), Script::success().incrementing(slot(0)))
            .with_script(b.hash(), Script::revert())
            .with_script(t.hash(), Script::success().incrementing(slot(0)));
        let (block, _, ledger) = build(&mut applier, vec![s.clone(), a, b, t.clone()], 1_000_000);

        assert_eq!(hashes(&block.body.transactions), vec![s.hash(), t.hash()]);
        assert_eq!(ledger.storage.get(CONTRACT, slot(0)).unwrap(), U256::from(2));
        // s, then the rolled back a, then t, which sees s's write again
        assert_eq!(applier.observed_originals(), &[U256::ZERO, U256::from(1), U256::from(1)]);
    }

    #[test]
    fn successful_bundle_releases_snapshots() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 21_000), one, false);
        let b = member(tx(2, 0, 21_000), one, false);
        let s = tx(3, 0, 21_000);

        let mut recorder = DepthRecorder::default();
        let mut block = block(vec![a, b, s], 1_000_000);
        let mut ledger = ledger_with_accounts();
        let mut tracer = ReceiptsTracer::new();
        BlockProducer::new(&mut recorder)
            .process_transactions(&mut block, &mut ledger, &mut tracer, &mut ())
            .unwrap();

        assert_eq!(block.body.transactions.len(), 3);
        // the bundle checkpoint, plus one floor per executed member, then
        // nothing outstanding once the bundle is in
        assert_eq!(recorder.depths, vec![(1, 1), (1, 2), (0, 0)]);
    }

    #[test]
    fn truncated_bundle_is_judged_on_collected_members() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 60), one, false);
        let b = member(tx(2, 0, 120), one, false);

        let mut applier = ScriptedApplier::default();
        let (block, receipts, _) = build(&mut applier, vec![a.clone(), b], 100);

        // b never fits, so scanning stops and the run holding a is executed
        assert_eq!(hashes(&block.body.transactions), vec![a.hash()]);
        assert_eq!(receipts.len(), 1);
        assert_eq!(block.header.gas_used, 60);
    }

    #[test]
    fn bundle_exceeding_remaining_gas_fails() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 60), one, false);
        let b = member(tx(2, 0, 60), one, false);
        let c = tx(3, 0, 30);

        let mut applier = ScriptedApplier::default();
        let (block, receipts, _) = build(&mut applier, vec![a, b, c.clone()], 100);

        assert_eq!(hashes(&block.body.transactions), vec![c.hash()]);
        assert_eq!(receipts.len(), 1);
        assert_eq!(block.header.gas_used, 30);
    }

    #[test]
    fn standalone_interrupts_bundle() {
        let one = B256::repeat_byte(1);
        let a = member(tx(1, 0, 21_000), one, false);
        let s = tx(2, 0, 21_000);
        let b = member(tx(3, 0, 21_000), one, false);

        let mut applier = ScriptedApplier::default();
        let (block, _, _) = build(&mut applier, vec![a.clone(), s.clone(), b.clone()], 1_000_000);

        // grouping is by adjacency of equal bundle hashes
        assert_eq!(hashes(&block.body.transactions), vec![a.hash(), s.hash(), b.hash()]);
        assert_eq!(included_bundles(&block.body.transactions), vec![one, one]);
    }

    #[test]
    fn included_bundles_reports_runs() {
        let (one, two) = (B256::repeat_byte(1), B256::repeat_byte(2));
        let txs = vec![
            tx(1, 0, 21_000),
            member(tx(2, 0, 21_000), one, false),
            member(tx(3, 0, 21_000), one, false),
            member(tx(4, 0, 21_000), two, false),
            tx(5, 0, 21_000),
            member(tx(6, 0, 21_000), two, false),
        ];
        assert_eq!(included_bundles(&txs), vec![one, two, two]);
        assert!(included_bundles(&txs[..1]).is_empty());
        assert!(included_bundles(&[]).is_empty());
    }

    #[test]
    fn observer_sees_final_order_only() {
        let (one, two) = (B256::repeat_byte(1), B256::repeat_byte(2));
        let s = tx(1, 0, 21_000);
        let a = member(tx(2, 0, 21_000), one, false);
        let b = member(tx(3, 0, 21_000), one, false);
        let c = member(tx(4, 0, 21_000), two, false);
        let d = tx(5, 0, 21_000);

        let mut applier = ScriptedApplier::default().with_script(b.hash(), Script::revert());
        let mut block = block(vec![s.clone(), a, b, c.clone(), d.clone()], 1_000_000);
        let mut ledger = ledger_with_accounts();
        let mut tracer = ReceiptsTracer::new();

        let mut seen = Vec::new();
        let mut observer = |index: usize, tx: &Transaction, receipt: &Receipt| {
            assert_eq!(tx.hash(), receipt.tx_hash);
            seen.push((index, tx.hash()));
        };
        BlockProducer::new(&mut applier)
            .process_transactions(&mut block, &mut ledger, &mut tracer, &mut observer)
            .unwrap();

        assert_eq!(seen, vec![(0, s.hash()), (1, c.hash()), (2, d.hash())]);
        assert_eq!(hashes(&block.body.transactions), vec![s.hash(), c.hash(), d.hash()]);
    }

    #[test]
    fn idempotent_across_fresh_ledgers() {
        let one = B256::repeat_byte(1);
        let candidates = vec![
            tx(1, 0, 21_000),
            member(tx(2, 0, 21_000), one, false),
            member(tx(3, 0, 21_000), one, true),
            tx(4, 0, 21_000),
        ];
        let script = |applier: ScriptedApplier| {
            applier.with_script(candidates[2].hash(), Script::revert())
        };

        let mut first = script(ScriptedApplier::default());
        let (first, first_receipts, _) = build(&mut first, candidates.clone(), 1_000_000);
        let mut second = script(ScriptedApplier::default());
        let (second, second_receipts, _) = build(&mut second, candidates.clone(), 1_000_000);

        assert_eq!(first.body.transactions, second.body.transactions);
        assert_eq!(first.header.gas_used, second.header.gas_used);
        assert_eq!(first.header.transactions_root, second.header.transactions_root);
        assert_eq!(first_receipts, second_receipts);
    }

    #[test]
    fn skip_nonce_verification_rewrites_nonce() {
        let a = tx(1, 7, 21_000);
        let mut block = block(vec![a.clone()], 1_000_000);
        let mut ledger = ledger_with_accounts();
        let mut tracer = ReceiptsTracer::new();

        // nonce 7 is rejected when verified
        let receipts = BlockProducer::new(ScriptedApplier::default())
            .process_transactions(&mut block, &mut ledger, &mut tracer, &mut ())
            .unwrap();
        assert!(!receipts[0].is_success());

        let mut block = crate::test_utils::block(vec![a.clone()], 1_000_000);
        let mut ledger = ledger_with_accounts();
        let mut tracer = ReceiptsTracer::new();
        let receipts = BlockProducer::new(ScriptedApplier::default())
            .with_options(ProcessingOptions::default().with_skip_nonce_verification(true))
            .process_transactions(&mut block, &mut ledger, &mut tracer, &mut ())
            .unwrap();
        assert!(receipts[0].is_success());
        assert_eq!(block.body.transactions[0].nonce(), 0);
        assert_eq!(block.body.transactions[0].hash(), a.hash());
    }

    #[test]
    fn existing_gas_used_is_respected() {
        let a = tx(1, 0, 50);
        let mut block = block(vec![a], 100);
        block.header.gas_used = 60;
        let mut ledger = ledger_with_accounts();
        let mut tracer = ReceiptsTracer::new();

        BlockProducer::new(ScriptedApplier::default())
            .process_transactions(&mut block, &mut ledger, &mut tracer, &mut ())
            .unwrap();
        assert!(block.body.transactions.is_empty());
        assert_eq!(block.header.gas_used, 60);
    }

    #[test]
    fn ledger_is_committed() {
        let one = B256::repeat_byte(1);
        let mut applier = ScriptedApplier::default();
        let (_, _, ledger) =
            build(&mut applier, vec![member(tx(1, 0, 21_000), one, false)], 1_000_000);
        assert_eq!(ledger.state.snapshot_depth(), 0);
        assert_eq!(ledger.storage.snapshot_depth(), 0);
    }
}
