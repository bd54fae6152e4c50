//! Error taxonomy of the coordination engine.
//!
//! Every failure surfaced by the publisher, subscriber, or lifecycle maps to
//! one variant here. The uppercase code strings returned by
//! [`DyadError::code`] are a stable contract consumed by external tooling;
//! variants may gain payloads but codes never change or disappear.
//!
//! None of these ever reach the host application: hook bodies log the code
//! and fall through to the real I/O call.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DyadError {
    #[error("local syscall failed: {0}")]
    Sysfail(#[source] std::io::Error),

    #[error("context is not initialized or has no transport")]
    NoCtx,

    #[error("transport failure: {0}")]
    Broker(String),

    #[error("KVS commit failed: {0}")]
    BadCommit(String),

    #[error("KVS lookup failed: {0}")]
    BadLookup(String),

    #[error("fetch request failed: {0}")]
    BadFetch(String),

    #[error("malformed fetch response: {0}")]
    BadResponse(String),

    #[error("could not issue RPC: {0}")]
    BadRpc(String),

    #[error("local file I/O failed: {0}")]
    BadFio(#[source] std::io::Error),

    #[error("path {0:?} is not under a managed prefix")]
    BadManagedPath(PathBuf),

    #[error("could not pack KVS transaction: {0}")]
    BadPack(String),

    #[error("could not decode KVS value: {0}")]
    BadUnpack(String),

    #[error("stream ended before any data arrived")]
    RpcFinished,

    #[error("base64 decode failed")]
    BadB64Decode,

    #[error("unsupported communication mode")]
    BadCommMode,
}

impl DyadError {
    /// Stable uppercase code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            DyadError::Sysfail(_) => "SYSFAIL",
            DyadError::NoCtx => "NOCTX",
            DyadError::Broker(_) => "FLUXFAIL",
            DyadError::BadCommit(_) => "BADCOMMIT",
            DyadError::BadLookup(_) => "BADLOOKUP",
            DyadError::BadFetch(_) => "BADFETCH",
            DyadError::BadResponse(_) => "BADRESPONSE",
            DyadError::BadRpc(_) => "BADRPC",
            DyadError::BadFio(_) => "BADFIO",
            DyadError::BadManagedPath(_) => "BADMANAGEDPATH",
            DyadError::BadPack(_) => "BADPACK",
            DyadError::BadUnpack(_) => "BADUNPACK",
            DyadError::RpcFinished => "RPC_FINISHED",
            DyadError::BadB64Decode => "BAD_B64DECODE",
            DyadError::BadCommMode => "BAD_COMM_MODE",
        }
    }
}

/// Code string reported when a hook body completes cleanly.
pub const CODE_OK: &str = "OK";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(DyadError::NoCtx.code(), "NOCTX");
        assert_eq!(DyadError::RpcFinished.code(), "RPC_FINISHED");
        assert_eq!(DyadError::BadB64Decode.code(), "BAD_B64DECODE");
        assert_eq!(DyadError::Broker("down".into()).code(), "FLUXFAIL");
        assert_eq!(
            DyadError::Sysfail(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).code(),
            "SYSFAIL"
        );
    }

    #[test]
    fn test_display_carries_cause() {
        let err = DyadError::BadCommit("broker closed the stream".into());
        assert!(err.to_string().contains("broker closed the stream"));
    }
}
