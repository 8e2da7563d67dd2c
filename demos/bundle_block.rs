//! Builds a block mixing standalone transactions and bundles, executing
//! Foundry's default Counter.sol contract with revm.
//!
//! One bundle succeeds, despite one of its members reverting, because that
//! member is allowed to revert. The other bundle fails and leaves no trace.

use alloy::{
    consensus::{Block, BlockBody, Header},
    primitives::{hex, Address, Bytes, TxKind, B256, U256},
};
use bundle_builder::{
    db::Ledger, included_bundles, BlockProducer, BundleMembership, EvmApplier, Receipt,
    ReceiptsTracer, Transaction,
};
use revm::bytecode::Bytecode;

/// Foundry's default Counter.sol contract bytecode.
const CONTRACT_BYTECODE: &str = "0x6080604052348015600f57600080fd5b5060043610603c5760003560e01c80633fb5c1cb1460415780638381f58a146053578063d09de08a14606d575b600080fd5b6051604c3660046083565b600055565b005b605b60005481565b60405190815260200160405180910390f35b6051600080549080607c83609b565b9190505550565b600060208284031215609457600080fd5b5035919050565b60006001820160ba57634e487b7160e01b600052601160045260246000fd5b506001019056fea2646970667358221220091e48831e9eee32d4571d6291233a4fdaaa34b7dced8770f36f5368be825c5264736f6c63430008190033";

/// The address of Counter.sol
const CONTRACT_ADDR: Address = Address::with_last_byte(32);

/// `increment()`
const INCREMENT: [u8; 4] = hex!("d09de08a");

/// No such function, the call reverts.
const UNKNOWN: [u8; 4] = hex!("deadbeef");

const ALICE: Address = Address::with_last_byte(1);
const BOB: Address = Address::with_last_byte(2);
const CAROL: Address = Address::with_last_byte(3);

fn call(sender: Address, nonce: u64, input: [u8; 4]) -> Transaction {
    Transaction::new(
        sender,
        nonce,
        100_000,
        0,
        TxKind::Call(CONTRACT_ADDR),
        U256::ZERO,
        Bytes::copy_from_slice(&input),
    )
}

fn main() -> eyre::Result<()> {
    let mut ledger = Ledger::default();
    let bytecode = Bytecode::new_raw(hex::decode(CONTRACT_BYTECODE)?.into());
    ledger.state.set_code(CONTRACT_ADDR, bytecode)?;
    for sender in [ALICE, BOB, CAROL] {
        ledger.state.set_balance(sender, U256::from(1_000_000_000_000_000_000u64))?;
    }

    let good = BundleMembership::new(B256::repeat_byte(1));
    let bad = BundleMembership::new(B256::repeat_byte(2));

    let candidates = vec![
        call(ALICE, 0, INCREMENT),
        call(BOB, 0, INCREMENT).in_bundle(good),
        call(CAROL, 0, UNKNOWN).in_bundle(good.with_can_revert(true)),
        call(ALICE, 1, INCREMENT).in_bundle(bad),
        call(BOB, 1, UNKNOWN).in_bundle(bad),
        call(CAROL, 1, INCREMENT),
    ];

    let mut block = Block {
        header: Header { number: 1, gas_limit: 30_000_000, ..Default::default() },
        body: BlockBody { transactions: candidates, ommers: vec![], withdrawals: None },
    };

    let mut observer = |index: usize, tx: &Transaction, receipt: &Receipt| {
        println!(
            "#{index} {} from {} success={} gas={}",
            tx.hash(),
            tx.sender(),
            receipt.is_success(),
            receipt.gas_used
        );
    };

    let mut tracer = ReceiptsTracer::new();
    let receipts = BlockProducer::new(EvmApplier::new()).process_transactions(
        &mut block,
        &mut ledger,
        &mut tracer,
        &mut observer,
    )?;

    println!("included {} of 6 candidates", block.body.transactions.len());
    println!("bundles: {:?}", included_bundles(&block.body.transactions));
    println!("gas used: {}", block.header.gas_used);
    println!("transactions root: {}", block.header.transactions_root);
    println!("receipts: {}", receipts.len());

    // Alice's bundled increment was rolled back with its bundle
    let number = ledger.storage.get(CONTRACT_ADDR, U256::ZERO)?;
    println!("counter: {number}");
    assert_eq!(number, U256::from(3));

    Ok(())
}
