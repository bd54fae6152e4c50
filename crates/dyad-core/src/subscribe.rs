//! Consumer side: resolve the owner of a file and materialize it locally.

use std::io::Write;
use std::path::Path;

use dyad_ipc::IpcError;
use tracing::debug;

use crate::ctx::DyadCtx;
use crate::error::DyadError;
use crate::keygen::gen_path_key;
use crate::path::mkdir_as_needed;

/// Wait for `user_path` to be published, then fetch it from its owner rank
/// and write it under `consumer_prefix` — unless the owner's storage is
/// already visible here (shared storage, or the owner is this rank).
///
/// The caller must have cleared the context's re-entrancy flag: the local
/// file write below goes through the intercepted entry points and relies on
/// them falling through to the real symbols.
pub fn subscribe(
    ctx: &DyadCtx,
    consumer_prefix: &Path,
    user_path: &str,
) -> Result<(), DyadError> {
    if user_path.is_empty() || user_path.starts_with('/') {
        return Err(DyadError::BadManagedPath(user_path.into()));
    }
    let topic = gen_path_key(user_path, ctx.config.key_depth, ctx.config.key_bins);
    let client = ctx.client.as_ref().ok_or(DyadError::NoCtx)?;

    debug!(topic = %topic, "waiting for owner");
    let owner = client
        .borrow_mut()
        .kvs_lookup_wait(ctx.config.kvs_namespace.as_deref(), &topic)
        .map_err(|e| match e {
            IpcError::Decode(_) => DyadError::BadUnpack(e.to_string()),
            IpcError::UnexpectedReply(_) => DyadError::Broker(e.to_string()),
            other => DyadError::BadLookup(other.to_string()),
        })?;
    debug!(owner, rank = ctx.rank, "owner resolved");

    // Already visible locally; nothing to transfer.
    if ctx.config.shared_storage || owner == ctx.rank {
        return Ok(());
    }

    let data = client
        .borrow_mut()
        .fetch(owner, user_path)
        .map_err(|e| match e {
            IpcError::Finished => DyadError::RpcFinished,
            IpcError::Decode(_) => DyadError::BadResponse(e.to_string()),
            IpcError::Io(_) => DyadError::BadRpc(e.to_string()),
            other => DyadError::BadFetch(other.to_string()),
        })?;
    debug!(len = data.len(), upath = user_path, "received file payload");

    let out_path = consumer_prefix.join(user_path);
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            mkdir_as_needed(parent).map_err(DyadError::Sysfail)?;
        }
    }

    let mut out = std::fs::File::create(&out_path).map_err(DyadError::BadFio)?;
    out.write_all(&data).map_err(DyadError::BadFio)?;
    out.flush().map_err(DyadError::BadFio)?;
    Ok(())
}
