//! Per-thread coordination context.
//!
//! One context per thread, created lazily on the thread's first intercepted
//! call and torn down with the thread. The broker connection it owns is
//! only ever used from the owning thread, which is why a `RefCell` is
//! enough around the client.
//!
//! A context with no client is the degraded mode: every coordination
//! decision becomes a no-op and the interposer falls through to the real
//! I/O symbols.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use dyad_ipc::BrokerClient;
use tracing::{debug, warn};

use crate::config::DyadConfig;

/// Ranks whose `sync_start` barrier this process has already joined.
///
/// The startup barrier is a process-level event counted per rank by the
/// broker; contexts are per thread. Only the first context built for a
/// given rank joins the barrier — every later thread's context reuses that
/// outcome, so a process contributes exactly one arrival no matter how
/// many of its threads touch files. (Keyed by rank rather than a bare
/// `Once` so a test process hosting several ranks still arrives once per
/// rank.)
static SYNC_START_DONE: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());

fn claim_sync_start(rank: u32) -> bool {
    SYNC_START_DONE
        .lock()
        .map(|mut done| done.insert(rank))
        .unwrap_or(false)
}

pub struct DyadCtx {
    pub initialized: bool,
    pub config: DyadConfig,
    pub client: Option<RefCell<BrokerClient>>,
    pub rank: u32,
    /// False while a hook body performs its own I/O; any intercepted entry
    /// point observing false falls through to the real symbol.
    pub reenter: Cell<bool>,
    pub sync_started: bool,
}

impl DyadCtx {
    /// Build a context from configuration: connect the transport, learn the
    /// rank, and take the startup barrier when one is configured and this
    /// process has not joined it yet — the barrier is once per process,
    /// while contexts are once per thread. Transport failure is not fatal;
    /// it produces a degraded context.
    pub fn init(config: DyadConfig) -> Self {
        let mut client = match BrokerClient::connect(&config.socket_path) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(
                    socket = %config.socket_path.display(),
                    error = %e,
                    "broker unavailable; coordination disabled"
                );
                None
            }
        };
        let rank = client.as_ref().map(BrokerClient::rank).unwrap_or(0);

        let mut sync_started = false;
        if let Some(nprocs) = config.sync_start {
            if let Some(c) = client.as_mut() {
                if claim_sync_start(c.rank()) {
                    match c.barrier("sync_start", nprocs) {
                        Ok(()) => {
                            sync_started = true;
                            println!("DYAD synchronized start at {}", wallclock());
                        }
                        Err(e) => warn!(nprocs, error = %e, "startup barrier failed"),
                    }
                } else {
                    debug!(rank = c.rank(), "startup barrier already joined by this process");
                }
            }
        }

        debug!(
            rank,
            key_depth = config.key_depth,
            key_bins = config.key_bins,
            shared_storage = config.shared_storage,
            namespace = config.kvs_namespace.as_deref().unwrap_or("default"),
            degraded = client.is_none(),
            "context initialized"
        );

        Self {
            initialized: true,
            config,
            client: client.map(RefCell::new),
            rank,
            reenter: Cell::new(true),
            sync_started,
        }
    }

    /// True when coordination can run at all.
    pub fn active(&self) -> bool {
        self.initialized && self.client.is_some()
    }
}

impl Drop for DyadCtx {
    fn drop(&mut self) {
        if self.sync_started {
            println!("DYAD stops at {}", wallclock());
        }
    }
}

/// Clears a context's re-entrancy flag and restores the previous value on
/// drop, including on early returns out of a failing hook body.
pub struct ReenterGuard<'a> {
    flag: &'a Cell<bool>,
    prior: bool,
}

impl<'a> ReenterGuard<'a> {
    pub fn clear(flag: &'a Cell<bool>) -> Self {
        let prior = flag.replace(false);
        Self { flag, prior }
    }
}

impl Drop for ReenterGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.prior);
    }
}

fn wallclock() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", now.as_secs(), now.subsec_nanos())
}
