/// Policy flags for one block build.
///
/// Read by the [`BlockProducer`] and passed through to the [`TxApplier`].
///
/// [`BlockProducer`]: crate::BlockProducer
/// [`TxApplier`]: crate::TxApplier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProcessingOptions {
    /// Replace each transaction's nonce with the sender's current nonce
    /// before applying it, instead of verifying it.
    pub skip_nonce_verification: bool,
}

impl ProcessingOptions {
    /// Set whether nonce verification is skipped.
    pub const fn with_skip_nonce_verification(mut self, skip: bool) -> Self {
        self.skip_nonce_verification = skip;
        self
    }
}
