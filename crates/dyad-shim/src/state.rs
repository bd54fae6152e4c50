//! Per-thread context storage for the hooks.
//!
//! The context is installed lazily on a thread's first intercepted call and
//! torn down with the thread. A busy flag covers the initialization window
//! so any I/O the setup itself performs (the broker connect, logging) falls
//! straight through to the real symbols, and `try_with` covers thread
//! teardown, where the context's own socket close re-enters the hooks while
//! thread-local storage is already being destroyed.
//!
//! Process-level startup work is not repeated per thread: the constructor
//! primes the loading thread's context before application code runs, and
//! the `sync_start` barrier join inside context init is guarded once per
//! process, so later threads reuse the outcome instead of rejoining.

use std::cell::{Cell, RefCell};
use std::sync::Once;

use dyad_core::{logging, DyadConfig, DyadCtx};

thread_local! {
    static CTX: RefCell<Option<DyadCtx>> = const { RefCell::new(None) };
    static CTX_BUSY: Cell<bool> = const { Cell::new(false) };
}

static LOG_INIT: Once = Once::new();

/// Run `f` against this thread's context, initializing it first if needed.
/// Returns `None` whenever no context can be produced or touched right now;
/// callers treat that as "pass through to the real call".
pub(crate) fn with_ctx<R>(f: impl FnOnce(&DyadCtx) -> R) -> Option<R> {
    if CTX_BUSY.try_with(Cell::get).unwrap_or(true) {
        return None;
    }
    CTX.try_with(|slot| {
        if slot.borrow().is_none() {
            CTX_BUSY.with(|busy| busy.set(true));
            let config = DyadConfig::from_env();
            LOG_INIT.call_once(|| logging::init(config.debug));
            let ctx = DyadCtx::init(config);
            *slot.borrow_mut() = Some(ctx);
            CTX_BUSY.with(|busy| busy.set(false));
        }
        slot.borrow().as_ref().map(f)
    })
    .ok()
    .flatten()
}

/// Eagerly build the loading thread's context before the application's
/// entry point runs.
pub(crate) fn startup() {
    let _ = with_ctx(|_| {});
}
