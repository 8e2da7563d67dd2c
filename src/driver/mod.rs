mod alloy;
pub use alloy::{bundle_hash, BundleError, BundleSource};

mod block;
pub use block::{included_bundles, BlockProducer, BuildError};

mod bundle;
