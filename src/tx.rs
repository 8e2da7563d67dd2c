use alloy::{
    consensus::{transaction::Recovered, Transaction as _, TxEnvelope},
    eips::eip2718::Encodable2718,
    primitives::{keccak256, Address, Bytes, TxKind, B256, U256},
    rlp::{BufMut, Encodable, Header, EMPTY_STRING_CODE},
};
use revm::context::TxEnv;

/// Membership of a transaction in an atomic bundle.
///
/// Transactions sharing a [`bundle_hash`] belong to the same group. Grouping
/// is decided purely by equality of the hash, never by position.
///
/// [`bundle_hash`]: Self::bundle_hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleMembership {
    /// Identifier of the bundle.
    pub bundle_hash: B256,
    /// Whether this transaction may revert without failing its bundle.
    pub can_revert: bool,
}

impl BundleMembership {
    /// Create a new membership. The transaction may not revert.
    pub const fn new(bundle_hash: B256) -> Self {
        Self { bundle_hash, can_revert: false }
    }

    /// Set whether the transaction may revert without failing its bundle.
    pub const fn with_can_revert(mut self, can_revert: bool) -> Self {
        self.can_revert = can_revert;
        self
    }
}

/// A candidate transaction for block production.
///
/// A transaction is either standalone or a bundle member, depending on
/// [`Transaction::bundle`]. The identity [`hash`] is fixed at construction,
/// and is not recomputed when the nonce is rewritten.
///
/// Transactions built from a signed envelope keep its EIP-2718 encoding,
/// which is what [`transactions_root`] commits to. Others are committed to
/// by a crate-specific RLP list of their fields, sender included.
///
/// [`hash`]: Self::hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    hash: B256,
    sender: Address,
    nonce: u64,
    gas_limit: u64,
    gas_price: u128,
    to: TxKind,
    value: U256,
    input: Bytes,
    encoded: Option<Bytes>,
    bundle: Option<BundleMembership>,
}

impl Transaction {
    /// Create a standalone transaction. The identity hash is the keccak of
    /// the RLP encoding of its fields.
    pub fn new(
        sender: Address,
        nonce: u64,
        gas_limit: u64,
        gas_price: u128,
        to: TxKind,
        value: U256,
        input: Bytes,
    ) -> Self {
        let mut tx = Self {
            hash: B256::ZERO,
            sender,
            nonce,
            gas_limit,
            gas_price,
            to,
            value,
            input,
            encoded: None,
            bundle: None,
        };
        tx.hash = keccak256(alloy::rlp::encode(&tx));
        tx
    }

    /// Create a standalone transaction from a sender-recovered envelope. The
    /// identity hash is the envelope's transaction hash.
    pub fn from_recovered(tx: Recovered<TxEnvelope>) -> Self {
        let (envelope, sender) = tx.into_parts();
        Self {
            hash: *envelope.tx_hash(),
            sender,
            nonce: envelope.nonce(),
            gas_limit: envelope.gas_limit(),
            gas_price: envelope.gas_price().unwrap_or_else(|| envelope.max_fee_per_gas()),
            to: envelope.kind(),
            value: envelope.value(),
            input: envelope.input().clone(),
            encoded: Some(envelope.encoded_2718().into()),
            bundle: None,
        }
    }

    /// Attach the transaction to a bundle.
    pub const fn in_bundle(mut self, membership: BundleMembership) -> Self {
        self.bundle = Some(membership);
        self
    }

    /// The identity hash of the transaction.
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    /// The sender of the transaction.
    pub const fn sender(&self) -> Address {
        self.sender
    }

    /// The nonce of the transaction.
    pub const fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Overwrite the nonce. Used when nonce verification is skipped.
    ///
    /// A different nonce no longer matches the signed envelope, so its
    /// encoding is dropped.
    pub fn set_nonce(&mut self, nonce: u64) {
        if nonce != self.nonce {
            self.encoded = None;
        }
        self.nonce = nonce;
    }

    /// The EIP-2718 encoding of the signed envelope this transaction was
    /// built from, if any.
    pub const fn encoded_2718(&self) -> Option<&Bytes> {
        self.encoded.as_ref()
    }

    /// Write the bytes committed to by [`transactions_root`].
    fn encode_for_root(&self, out: &mut dyn BufMut) {
        match &self.encoded {
            Some(encoded) => out.put_slice(encoded),
            None => self.encode(out),
        }
    }

    /// The gas limit of the transaction.
    pub const fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// The gas price of the transaction.
    pub const fn gas_price(&self) -> u128 {
        self.gas_price
    }

    /// The destination of the transaction.
    pub const fn to(&self) -> TxKind {
        self.to
    }

    /// The value transferred by the transaction.
    pub const fn value(&self) -> U256 {
        self.value
    }

    /// The input data of the transaction.
    pub const fn input(&self) -> &Bytes {
        &self.input
    }

    /// The bundle this transaction belongs to, if any.
    pub const fn bundle(&self) -> Option<&BundleMembership> {
        self.bundle.as_ref()
    }

    /// The bundle hash, if the transaction is a bundle member.
    pub fn bundle_hash(&self) -> Option<B256> {
        self.bundle.map(|b| b.bundle_hash)
    }

    /// True if the transaction is not part of a bundle.
    pub const fn is_standalone(&self) -> bool {
        self.bundle.is_none()
    }

    /// True if the transaction may revert without failing its bundle.
    /// Standalone transactions may always revert.
    pub fn can_revert(&self) -> bool {
        self.bundle.is_none_or(|b| b.can_revert)
    }

    /// Build the revm [`TxEnv`] for this transaction.
    pub fn tx_env(&self) -> TxEnv {
        TxEnv {
            caller: self.sender,
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
            kind: self.to,
            value: self.value,
            data: self.input.clone(),
            nonce: self.nonce,
            chain_id: None,
            ..Default::default()
        }
    }

    fn to_length(&self) -> usize {
        match &self.to {
            TxKind::Call(to) => to.length(),
            TxKind::Create => 1,
        }
    }

    fn rlp_payload_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to_length()
            + self.value.length()
            + self.input.length()
            + self.sender.length()
    }

    fn rlp_header(&self) -> Header {
        Header { list: true, payload_length: self.rlp_payload_length() }
    }
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut dyn BufMut) {
        self.rlp_header().encode(out);
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        match &self.to {
            TxKind::Call(to) => to.encode(out),
            TxKind::Create => out.put_u8(EMPTY_STRING_CODE),
        }
        self.value.encode(out);
        self.input.encode(out);
        self.sender.encode(out);
    }

    fn length(&self) -> usize {
        self.rlp_header().length_with_payload()
    }
}

/// Compute the transactions root over an ordered list of transactions.
///
/// This is the ordered trie root over the EIP-2718 encoding of each signed
/// transaction, as in an Ethereum header. Transactions without an envelope
/// contribute their RLP [`Encodable`] form instead.
pub fn transactions_root(txs: &[Transaction]) -> B256 {
    alloy::trie::root::ordered_trie_root_with_encoder(txs, |tx, buf| tx.encode_for_root(buf))
}
