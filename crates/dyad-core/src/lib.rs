//! # dyad-core
//!
//! Coordination engine for transparent producer-consumer file sharing.
//!
//! A producer rank that closes a file under its managed directory
//! advertises ownership of that file in a shared key-value store; a
//! consumer rank that opens the same user path under its own managed
//! directory resolves the owner, fetches the bytes over the broker, and
//! writes them locally before the real open proceeds. This crate holds the
//! engine — context, topic keys, publisher, subscriber — while `dyad-shim`
//! supplies the interception layer and `dyad-ipc` the broker wire contract.
//!
//! Nothing here is visible to the host application: the shim discards every
//! [`DyadError`] to a log line and always executes the real I/O call.

pub mod config;
pub mod ctx;
pub mod error;
pub mod keygen;
pub mod logging;
pub mod murmur3;
pub mod path;
pub mod publish;
pub mod subscribe;

pub use config::DyadConfig;
pub use ctx::{DyadCtx, ReenterGuard};
pub use error::{DyadError, CODE_OK};
pub use keygen::gen_path_key;
pub use publish::publish;
pub use subscribe::subscribe;
