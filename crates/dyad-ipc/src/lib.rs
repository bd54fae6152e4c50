//! # dyad-ipc
//!
//! Wire contract between a DYAD-instrumented process and its coordination
//! broker, plus a blocking client suitable for use from inside intercepted
//! I/O calls.
//!
//! Every message is a `u32` little-endian length prefix followed by a
//! bincode-serialized [`BrokerRequest`] or [`BrokerResponse`]. The one
//! exception is the fetch payload: after a [`BrokerResponse::FetchData`]
//! frame the broker writes exactly `len` raw bytes on the stream, so file
//! contents are never re-encoded.
//!
//! The broker plays the role of the per-rank coordination daemon: it owns
//! the shared key-value store, routes fetch requests to the owning rank,
//! and hosts named startup barriers. [`testing::TestBroker`] implements the
//! same contract in-process for integration tests.

use serde::{Deserialize, Serialize};

pub mod client;
pub mod testing;

pub use client::BrokerClient;

/// Default broker socket path, overridable with `DYAD_SOCKET_PATH`.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/dyad.sock";

/// Service name of the file-fetch RPC.
pub const FETCH_TOPIC: &str = "dyad.fetch";

/// Frames larger than this are rejected before allocation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Broker socket path from the environment, or the default.
pub fn socket_path_from_env() -> std::path::PathBuf {
    std::env::var_os("DYAD_SOCKET_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// One `key -> rank` ownership entry inside a KVS transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvsEntry {
    pub key: String,
    pub rank: u32,
}

/// A packed KVS transaction. Entries are applied atomically by the broker;
/// the commit reply is sent only after the transaction is durable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvsTxn {
    entries: Vec<KvsEntry>,
}

impl KvsTxn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &str, rank: u32) {
        self.entries.push(KvsEntry {
            key: key.to_string(),
            rank,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KvsEntry] {
        &self.entries
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum BrokerRequest {
    Hello {
        client_version: String,
    },
    KvsCommit {
        namespace: Option<String>,
        txn: KvsTxn,
    },
    /// Wait-create lookup: the broker holds the reply until the key exists.
    KvsLookupWait {
        namespace: Option<String>,
        key: String,
    },
    /// Point-to-point fetch of a produced file, routed to `owner`'s rank.
    Fetch {
        owner: u32,
        upath: String,
    },
    Barrier {
        name: String,
        nprocs: u32,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub enum BrokerResponse {
    HelloAck { rank: u32, broker_version: String },
    CommitAck,
    LookupValue { rank: u32 },
    /// Followed by exactly `len` raw bytes on the stream.
    FetchData { len: u64 },
    BarrierAck,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("request encode failed: {0}")]
    Encode(bincode::Error),
    #[error("reply decode failed: {0}")]
    Decode(bincode::Error),
    #[error("stream ended before a reply arrived")]
    Finished,
    #[error("broker refused the request: {0}")]
    Broker(String),
    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

/// Write one length-prefixed frame.
pub fn write_frame<W, T>(w: &mut W, msg: &T) -> Result<(), IpcError>
where
    W: std::io::Write,
    T: Serialize,
{
    let bytes = bincode::serialize(msg).map_err(IpcError::Encode)?;
    let len = (bytes.len() as u32).to_le_bytes();
    w.write_all(&len)?;
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(())
}

/// Read one length-prefixed frame. A clean end-of-stream while waiting for
/// the length prefix surfaces as [`IpcError::Finished`].
pub fn read_frame<R, T>(r: &mut R) -> Result<T, IpcError>
where
    R: std::io::Read,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    if let Err(e) = r.read_exact(&mut len_buf) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(IpcError::Finished);
        }
        return Err(IpcError::Io(e));
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(IpcError::Broker(format!("frame of {len} bytes refused")));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    bincode::deserialize(&buf).map_err(IpcError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let mut txn = KvsTxn::new();
        txn.put("3f.a1.9.data/out.bin", 4);
        let req = BrokerRequest::KvsCommit {
            namespace: Some("jobns".to_string()),
            txn,
        };
        let bytes = bincode::serialize(&req).unwrap();
        let decoded: BrokerRequest = bincode::deserialize(&bytes).unwrap();
        match decoded {
            BrokerRequest::KvsCommit { namespace, txn } => {
                assert_eq!(namespace.as_deref(), Some("jobns"));
                assert_eq!(txn.entries().len(), 1);
                assert_eq!(txn.entries()[0].rank, 4);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_response_roundtrip() {
        let resp = BrokerResponse::FetchData { len: 1048576 };
        let bytes = bincode::serialize(&resp).unwrap();
        let decoded: BrokerResponse = bincode::deserialize(&bytes).unwrap();
        assert!(matches!(decoded, BrokerResponse::FetchData { len: 1048576 }));
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &BrokerRequest::Barrier {
            name: "sync_start".to_string(),
            nprocs: 2,
        })
        .unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let req: BrokerRequest = read_frame(&mut cursor).unwrap();
        assert!(matches!(
            req,
            BrokerRequest::Barrier { nprocs: 2, .. }
        ));
    }

    #[test]
    fn test_read_frame_eof_is_finished() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let err = read_frame::<_, BrokerResponse>(&mut cursor).unwrap_err();
        assert!(matches!(err, IpcError::Finished));
    }

    #[test]
    fn test_oversized_frame_refused() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame::<_, BrokerResponse>(&mut cursor).unwrap_err();
        assert!(matches!(err, IpcError::Broker(_)));
    }

    #[test]
    fn test_default_socket_path() {
        assert!(DEFAULT_SOCKET_PATH.ends_with(".sock"));
    }
}
