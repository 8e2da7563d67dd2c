use crate::{BundleMembership, Transaction};
use alloy::{
    consensus::{
        crypto::RecoveryError,
        transaction::{Recovered, SignerRecoverable},
        Header, TxEnvelope,
    },
    eips::eip2718::{Decodable2718, Eip2718Error},
    primitives::{bytes::Buf, keccak256, B256},
    rpc::types::mev::EthSendBundle,
};

/// Possible errors that can occur while turning a bundle into candidates.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// The bundle targets a different block.
    #[error("bundle targets block {expected}, but block {actual} is being built")]
    BlockNumberMismatch {
        /// The block number of the bundle.
        expected: u64,
        /// The block number being built.
        actual: u64,
    },
    /// The block timestamp is outside of the bundle's range.
    #[error("timestamp {0} out of range")]
    TimestampOutOfRange(u64),
    /// The bundle contains no transactions.
    #[error("empty bundle")]
    Empty,
    /// An error occurred while decoding a transaction contained in the bundle.
    #[error("transaction decoding error")]
    TransactionDecodingError(#[from] Eip2718Error),
    /// An error occurred while recovering the sender of a transaction.
    #[error("transaction sender recovery error")]
    TransactionSenderRecoveryError(#[from] RecoveryError),
}

/// A source of bundle members for block production.
pub trait BundleSource {
    /// Check the bundle against the header of the block being built, and
    /// produce its transactions as candidates, in bundle order.
    ///
    /// All candidates share one bundle hash, so that they are executed
    /// atomically when placed next to each other.
    fn to_candidates(&self, header: &Header) -> Result<Vec<Transaction>, BundleError>;
}

/// Hash of a bundle, computed as the keccak of the concatenated transaction
/// hashes.
pub fn bundle_hash<'a>(tx_hashes: impl IntoIterator<Item = &'a B256>) -> B256 {
    let mut buf = Vec::new();
    for hash in tx_hashes {
        buf.extend_from_slice(hash.as_slice());
    }
    keccak256(buf)
}

impl BundleSource for EthSendBundle {
    fn to_candidates(&self, header: &Header) -> Result<Vec<Transaction>, BundleError> {
        // 1. Check if the block we're building is the one this bundle targets
        if header.number != self.block_number {
            return Err(BundleError::BlockNumberMismatch {
                expected: self.block_number,
                actual: header.number,
            });
        }

        // 2. Check the timestamp range
        if self.min_timestamp.is_some_and(|min| header.timestamp < min)
            || self.max_timestamp.is_some_and(|max| header.timestamp > max)
        {
            return Err(BundleError::TimestampOutOfRange(header.timestamp));
        }

        if self.txs.is_empty() {
            return Err(BundleError::Empty);
        }

        let txs = self
            .txs
            .iter()
            .map(|tx| TxEnvelope::decode_2718(&mut tx.chunk()))
            .collect::<Result<Vec<_>, _>>()?;

        let bundle_hash = bundle_hash(txs.iter().map(TxEnvelope::tx_hash));
        let membership = BundleMembership::new(bundle_hash);

        txs.into_iter()
            .map(|tx| -> Result<Transaction, BundleError> {
                let sender = tx.recover_signer()?;
                // Reverting transactions may be included if they are in the
                // set of hashes allowed to revert.
                let can_revert = self.reverting_tx_hashes.contains(tx.tx_hash());
                Ok(Transaction::from_recovered(Recovered::new_unchecked(tx, sender))
                    .in_bundle(membership.with_can_revert(can_revert)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        consensus::{SignableTransaction, TxEip1559},
        eips::eip2718::Encodable2718,
        primitives::{Address, Bytes, TxKind, U256},
        signers::{local::PrivateKeySigner, SignerSync},
    };

    fn signer() -> PrivateKeySigner {
        PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).unwrap()
    }

    fn signed(signer: &PrivateKeySigner, nonce: u64) -> TxEnvelope {
        let tx = TxEip1559 {
            chain_id: 1,
            nonce,
            gas_limit: 21_000,
            max_fee_per_gas: 10,
            max_priority_fee_per_gas: 1,
            to: TxKind::Call(Address::repeat_byte(0xb0)),
            value: U256::from(1),
            ..Default::default()
        };
        let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
        tx.into_signed(signature).into()
    }

    fn bundle(txs: &[TxEnvelope]) -> EthSendBundle {
        EthSendBundle {
            txs: txs.iter().map(|tx| Bytes::from(tx.encoded_2718())).collect(),
            block_number: 1,
            ..Default::default()
        }
    }

    fn header() -> Header {
        Header { number: 1, timestamp: 100, ..Default::default() }
    }

    #[test]
    fn decodes_members() {
        let signer = signer();
        let (a, b) = (signed(&signer, 0), signed(&signer, 1));
        let mut bundle = bundle(&[a.clone(), b.clone()]);
        bundle.reverting_tx_hashes = vec![*b.tx_hash()];

        let candidates = bundle.to_candidates(&header()).unwrap();
        assert_eq!(candidates.len(), 2);

        let expected = bundle_hash([a.tx_hash(), b.tx_hash()]);
        assert!(candidates.iter().all(|tx| tx.bundle_hash() == Some(expected)));
        assert!(candidates.iter().all(|tx| tx.sender() == signer.address()));
        assert_eq!(candidates[0].hash(), *a.tx_hash());
        assert_eq!(candidates[1].nonce(), 1);
        assert!(!candidates[0].can_revert());
        assert!(candidates[1].can_revert());
    }

    #[test]
    fn checks_block() {
        let signer = signer();
        let mut bundle = bundle(&[signed(&signer, 0)]);

        bundle.block_number = 2;
        assert!(matches!(
            bundle.to_candidates(&header()),
            Err(BundleError::BlockNumberMismatch { expected: 2, actual: 1 })
        ));

        bundle.block_number = 1;
        bundle.min_timestamp = Some(101);
        assert!(matches!(
            bundle.to_candidates(&header()),
            Err(BundleError::TimestampOutOfRange(100))
        ));

        bundle.min_timestamp = None;
        bundle.max_timestamp = Some(99);
        assert!(matches!(
            bundle.to_candidates(&header()),
            Err(BundleError::TimestampOutOfRange(100))
        ));
    }

    #[test]
    fn rejects_garbage() {
        let mut bundle = bundle(&[]);
        assert!(matches!(bundle.to_candidates(&header()), Err(BundleError::Empty)));

        bundle.txs = vec![Bytes::from_static(&[0x02, 0xc0])];
        assert!(matches!(
            bundle.to_candidates(&header()),
            Err(BundleError::TransactionDecodingError(_))
        ));
    }
}
