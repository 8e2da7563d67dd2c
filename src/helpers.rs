use crate::db::LedgerView;
use revm::{
    context::{BlockEnv, CfgEnv, TxEnv},
    Context, Journal,
};

/// [`revm::Context`] with default env types, running on a [`LedgerView`].
pub(crate) type Ctx<'a, Db> =
    Context<BlockEnv, TxEnv, CfgEnv, LedgerView<'a, Db>, Journal<LedgerView<'a, Db>>, ()>;
