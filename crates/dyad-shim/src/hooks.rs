//! Hook bodies: the decision logic between an intercepted entry point and
//! the engine, and the nested-I/O helpers that run with the re-entrancy
//! flag cleared.
//!
//! Nothing in here returns an error. Coordination failures end as one log
//! line; the caller always proceeds to the real I/O call.

use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::{debug, info};

use dyad_core::config::ENV_CHECK_RESULT;
use dyad_core::{path as managed, publish, subscribe, DyadCtx, DyadError, ReenterGuard};

use crate::{fd, reals, state};

/// Open-side applicability of the flags alone: a pure read-only open with
/// no creation intent.
pub(crate) fn wants_subscribe(oflag: libc::c_int) -> bool {
    (oflag & libc::O_ACCMODE) == libc::O_RDONLY && (oflag & libc::O_CREAT) == 0
}

/// Run the subscribe protocol for an application open of `path`, if it is
/// in scope. Never fails; the real open follows regardless.
pub(crate) fn open_sync(path: &str) {
    state::with_ctx(|ctx| {
        if !ctx.active() || !ctx.reenter.get() {
            return;
        }
        let result = match ctx.config.consumer_prefix() {
            None => Ok(()),
            Some(cons) => match managed::resolve_managed(cons, path) {
                None => {
                    debug!(path, "open outside the consumer-managed prefix");
                    Ok(())
                }
                Some(upath) => {
                    let _guard = ReenterGuard::clear(&ctx.reenter);
                    subscribe(ctx, cons, &upath)
                }
            },
        };
        finish(ctx, path, "open", result);
    });
}

/// Run the publish protocol after the real close of `path`, if it is in
/// scope.
pub(crate) fn close_sync(path: &str) {
    state::with_ctx(|ctx| {
        if !ctx.active() || !ctx.reenter.get() {
            return;
        }
        let result = match ctx.config.producer_prefix() {
            None => Ok(()),
            Some(prod) => match managed::resolve_managed(prod, path) {
                None => {
                    debug!(path, "close outside the producer-managed prefix");
                    Ok(())
                }
                Some(upath) => {
                    let _guard = ReenterGuard::clear(&ctx.reenter);
                    publish(ctx, prod, &upath)
                }
            },
        };
        finish(ctx, path, "close", result);
    });
}

fn finish(ctx: &DyadCtx, path: &str, side: &str, result: Result<(), DyadError>) {
    match result {
        Ok(()) => {
            if ctx.config.check {
                std::env::set_var(ENV_CHECK_RESULT, "ok");
            }
        }
        Err(e) => {
            info!(code = e.code(), error = %e, path, "coordination failed on {} side", side);
        }
    }
}

/// What a close-side hook decided before invoking the real close.
pub(crate) struct ClosePlan {
    pub path: String,
    pub sync_dir: bool,
    pub publish: bool,
}

/// Inspect a descriptor about to be closed. `None` means the hook has no
/// business with it and must reduce to the plain real call.
pub(crate) fn close_prepare(fd_num: libc::c_int) -> Option<ClosePlan> {
    if fd_num < 0 {
        return None;
    }
    state::with_ctx(|ctx| {
        if !ctx.active() || !ctx.reenter.get() {
            return None;
        }
        if fd::is_fd_dir(fd_num) {
            return None;
        }
        let path = fd::fd_path(fd_num)?;
        Some(ClosePlan {
            path,
            sync_dir: ctx.config.sync_dir,
            publish: fd::is_wronly(fd_num).unwrap_or(false),
        })
    })
    .flatten()
}

/// Flush the directory entry of a freshly written file: open-fsync-close the
/// parent directory through the real symbols.
/// See <https://lwn.net/Articles/457671/>.
pub(crate) fn sync_directory(path: &str) {
    let Some(parent) = Path::new(path).parent() else {
        return;
    };
    if parent.as_os_str().is_empty() {
        return;
    }
    let Ok(cpath) = std::ffi::CString::new(parent.as_os_str().as_bytes()) else {
        return;
    };
    state::with_ctx(|ctx| {
        let _guard = ReenterGuard::clear(&ctx.reenter);
        unsafe {
            let dirfd = reals::open_real(cpath.as_ptr(), libc::O_RDONLY);
            if dirfd < 0 {
                debug!(dir = %parent.display(), "cannot open parent directory");
                return;
            }
            if libc::fsync(dirfd) < 0 {
                debug!(dir = %parent.display(), "cannot flush parent directory");
            }
            if reals::close_real(dirfd) < 0 {
                debug!(dir = %parent.display(), "cannot close parent directory");
            }
        }
    });
}
