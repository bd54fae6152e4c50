//! Logging bootstrap.
//!
//! The engine runs inside other people's processes, so the subscriber is
//! installed with `try_init`: a host application that already configured
//! `tracing` wins, and our events flow into its subscriber instead.

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber once per process. `debug` widens the default
/// filter; `RUST_LOG` still overrides either default.
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
