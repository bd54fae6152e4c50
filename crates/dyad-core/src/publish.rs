//! Producer side: advertise ownership of a closed file.

use std::path::Path;

use dyad_ipc::{IpcError, KvsTxn};
use tracing::debug;

use crate::ctx::DyadCtx;
use crate::error::DyadError;
use crate::keygen::gen_path_key;

/// Commit `topic -> rank` for `user_path` and wait for the commit to be
/// durable. The caller's close does not return until this does: the
/// blocking commit is what downstream wait-create lookups order against.
pub fn publish(ctx: &DyadCtx, producer_prefix: &Path, user_path: &str) -> Result<(), DyadError> {
    if user_path.is_empty() || user_path.starts_with('/') {
        return Err(DyadError::BadManagedPath(user_path.into()));
    }
    let topic = gen_path_key(user_path, ctx.config.key_depth, ctx.config.key_bins);
    let client = ctx.client.as_ref().ok_or(DyadError::NoCtx)?;

    debug!(
        topic = %topic,
        prefix = %producer_prefix.display(),
        rank = ctx.rank,
        "publishing ownership"
    );

    let mut txn = KvsTxn::new();
    txn.put(&topic, ctx.rank);
    client
        .borrow_mut()
        .kvs_commit(ctx.config.kvs_namespace.as_deref(), txn)
        .map_err(|e| match e {
            IpcError::Encode(_) => DyadError::BadPack(e.to_string()),
            IpcError::UnexpectedReply(_) => DyadError::Broker(e.to_string()),
            other => DyadError::BadCommit(other.to_string()),
        })
}
