//! Bundle-aware block production on top of [`revm`].
//!
//! This crate assembles a block body from a sequence of candidate
//! transactions, executing them against ledger state. Some candidates are
//! members of _bundles_: groups of transactions that must be included
//! together, in order, or not at all. A bundle member may be marked as
//! allowed to revert, in which case its failure does not fail the bundle.
//!
//! Atomicity is provided by snapshots rather than by undoing effects. Before
//! a bundle executes, the [`BlockProducer`] snapshots three resources:
//!
//! - the account [`StateStore`],
//! - the contract [`StorageStore`],
//! - the receipts recorded by the [`ReceiptsTracer`].
//!
//! If the bundle fails, all three are restored together, and none of the
//! bundle's members are included or reported.
//!
//! ## Quickstart
//!
//! ```
//! use alloy::{
//!     consensus::{Block, BlockBody, Header},
//!     primitives::{Address, Bytes, TxKind, U256},
//! };
//! use bundle_builder::{db::Ledger, BlockProducer, EvmApplier, ReceiptsTracer, Transaction};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let alice = Address::repeat_byte(0xa1);
//! let bob = Address::repeat_byte(0xb0);
//!
//! let mut ledger = Ledger::default();
//! ledger.state.set_balance(alice, U256::from(1_000_000_000u64))?;
//!
//! let transfer =
//!     Transaction::new(alice, 0, 21_000, 0, TxKind::Call(bob), U256::from(7), Bytes::new());
//!
//! let mut block = Block {
//!     header: Header { number: 1, gas_limit: 30_000_000, ..Default::default() },
//!     body: BlockBody { transactions: vec![transfer], ommers: vec![], withdrawals: None },
//! };
//!
//! let mut tracer = ReceiptsTracer::new();
//! let receipts = BlockProducer::new(EvmApplier::new()).process_transactions(
//!     &mut block,
//!     &mut ledger,
//!     &mut tracer,
//!     &mut (),
//! )?;
//!
//! assert!(receipts[0].is_success());
//! assert_eq!(block.header.gas_used, 21_000);
//! assert_eq!(ledger.state.balance(bob)?, U256::from(7));
//! # Ok(())
//! # }
//! ```
//!
//! ## Building a block
//!
//! [`BlockProducer::process_transactions`] scans the candidates in order:
//!
//! - Candidates already included are skipped.
//! - Scanning stops at the first candidate whose gas limit exceeds the
//!   remaining block gas. Later, smaller candidates are not considered, so
//!   candidates should be sorted by priority.
//! - Standalone transactions are applied and included immediately.
//! - Consecutive candidates with the same bundle hash form a run. The run is
//!   executed as a unit when a candidate outside of it arrives, or when the
//!   candidates are exhausted.
//!
//! A run fails if any member fails and is not allowed to revert, or if a
//! member's gas limit exceeds the remaining block gas. Reverts and halts are
//! tolerated for members marked [`can_revert`]. Transactions rejected before
//! execution always fail their bundle.
//!
//! Failed transactions and failed bundles are not errors. The build only
//! returns a [`BuildError`] if the applier fails fatally, or if a snapshot or
//! the tracer is misused.
//!
//! ## Bundle members see each other's writes
//!
//! Within a bundle, each member observes the effects of the members before
//! it. After each member, the [`StorageStore`] takes a _floor snapshot_:
//! current slot values become the original values seen by the next member,
//! while the snapshot taken before the bundle can still unwind everything.
//! Standalone transactions advance the floor too, without a snapshot, so
//! [`original_value`] always reflects the start of the current transaction.
//!
//! ## Observing the block
//!
//! A [`TxObserver`] is notified of each included transaction, with its index
//! in the block body and its receipt. Bundle members are only reported once
//! the bundle has succeeded. Closures implement [`TxObserver`]:
//!
//! ```
//! # use bundle_builder::{Receipt, Transaction, TxObserver};
//! let mut included = vec![];
//! let mut observer = |index: usize, tx: &Transaction, _receipt: &Receipt| {
//!     included.push((index, tx.hash()));
//! };
//! # fn takes<O: TxObserver>(_: &mut O) {}
//! # takes(&mut observer);
//! ```
//!
//! ## Applying transactions
//!
//! Execution is delegated to a [`TxApplier`]. [`EvmApplier`] runs revm
//! directly on the [`Ledger`], so ledger snapshots cover EVM effects.
//! Custom appliers report exactly one outcome per transaction to the
//! [`ReceiptsTracer`].
//!
//! ## Bundles from RPC
//!
//! [`BundleSource`] turns an [`EthSendBundle`] into candidates. Its
//! `reverting_tx_hashes` mark the members allowed to revert.
//!
//! ### Feature flags
//!
//! Most feature flags are passed through to revm. The following are on by
//! default:
//!
//! - `c-kzg` - Enable KZG precompiles as specced for [EIP-4844].
//! - `blst` - Enable BLST precompiles as speced for [EIP-2537].
//! - `portable` - Compiles BLST in portable mode.
//! - `secp256k1` - Use libsecp256k1 for ecrecover (default is k256).
//!
//! The crate also provides:
//!
//! - `test-utils` - provides fixtures and a `ScriptedApplier` for testing
//!   block production without executing code.
//!
//! [`can_revert`]: BundleMembership::can_revert
//! [`original_value`]: db::StorageStore::original_value
//! [`EthSendBundle`]: alloy::rpc::types::mev::EthSendBundle
//! [`StateStore`]: db::StateStore
//! [`StorageStore`]: db::StorageStore
//! [`Ledger`]: db::Ledger
//! [EIP-2537]: https://eips.ethereum.org/EIPS/eip-2537
//! [EIP-4844]: https://eips.ethereum.org/EIPS/eip-4844

#![doc(
    html_logo_url = "https://raw.githubusercontent.com/alloy-rs/core/main/assets/alloy.jpg",
    html_favicon_url = "https://raw.githubusercontent.com/alloy-rs/core/main/assets/favicon.ico"
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod apply;
pub use apply::{ApplyError, EvmApplier, TxApplier};

pub mod db;

mod driver;
pub use driver::{
    bundle_hash, included_bundles, BlockProducer, BuildError, BundleError, BundleSource,
};

mod helpers;

mod observer;
pub use observer::TxObserver;

mod options;
pub use options::ProcessingOptions;

mod receipt;
pub use receipt::{FailureKind, Receipt};

mod set;
pub use set::{ByTxHash, Distinct, OrderedSet};

mod tracer;
pub use tracer::{ReceiptsTracer, TracerError};

mod tx;
pub use tx::{transactions_root, BundleMembership, Transaction};

pub use revm;

/// Utilities for testing block production.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
